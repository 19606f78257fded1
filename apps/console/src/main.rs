mod config;

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    cluster_view,
    feature_flags::{self, Feature},
    paths,
    store::get_at,
    template::{self, TemplateContext},
    ClusterPoller, ConsoleClient, Route, Severity, StateTree, SubmitOutcome, UpdateCluster,
    WizardController,
};
use serde::Serialize;
use serde_json::{json, Value};
use shared::{
    domain::{FleetStatusRequest, ImageStatus, InstanceAction, Page},
    error::PageErrors,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pcui-console", about = "Cluster management console")]
struct Args {
    /// Settings file; defaults to ./console.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    region: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load identity, version, inventory, clusters and images.
    Init,
    #[command(subcommand)]
    Clusters(ClusterCommand),
    #[command(subcommand)]
    Template(TemplateCommand),
    #[command(subcommand)]
    Images(ImageCommand),
    #[command(subcommand)]
    Users(UserCommand),
    #[command(subcommand)]
    Jobs(JobCommand),
    #[command(subcommand)]
    Instances(InstanceCommand),
    #[command(subcommand)]
    Costs(CostCommand),
}

#[derive(Subcommand, Debug)]
enum ClusterCommand {
    List,
    Describe { name: String },
    Delete { name: String },
    /// Print the cluster configuration as YAML.
    Config { name: String },
    Instances { name: String },
    Events { name: String },
    Logs {
        name: String,
        #[arg(long)]
        stream: Option<String>,
    },
    Fleet { name: String, action: FleetAction },
    /// Refresh the cluster until it stops transitioning.
    Watch { name: String },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        wait: bool,
    },
    Update {
        #[arg(long)]
        name: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FleetAction {
    Start,
    Stop,
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// Import a configuration into the wizard and validate every page offline.
    Check {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
        /// VPC to assume when the subnet inventory cannot resolve one.
        #[arg(long)]
        vpc: Option<String>,
        #[arg(long, default_value = "3.9.0")]
        version: String,
    },
}

#[derive(Subcommand, Debug)]
enum ImageCommand {
    List {
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
    Official {
        #[arg(long)]
        version: Option<String>,
    },
    Describe { id: String },
    Build {
        #[arg(long)]
        id: String,
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StatusArg {
    Available,
    Pending,
    Failed,
}

impl From<StatusArg> for ImageStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Available => ImageStatus::Available,
            StatusArg::Pending => ImageStatus::Pending,
            StatusArg::Failed => ImageStatus::Failed,
        }
    }
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    List,
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: Option<String>,
    },
    Delete { username: String },
}

#[derive(Subcommand, Debug)]
enum JobCommand {
    Queue {
        cluster: String,
        #[arg(long)]
        user: Option<String>,
    },
    Info {
        cluster: String,
        job_id: String,
    },
    Cancel {
        cluster: String,
        job_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum InstanceCommand {
    Start { instance_id: String },
    Stop { instance_id: String },
    /// Open a DCV session on an instance.
    Dcv {
        instance_id: String,
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CostCommand {
    Status,
    Activate,
    Data {
        cluster: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_optional(value: Option<impl Serialize>) -> Result<()> {
    match value {
        Some(value) => print_json(&value),
        None => bail!("request failed"),
    }
}

fn flush_notifications(client: &ConsoleClient) {
    for message in client.notifier().messages() {
        let label = match message.severity {
            Severity::Error => "error",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::InProgress => "in-progress",
        };
        eprintln!("[{label}] {}", message.content);
        client.notifier().dismiss(&message.id);
    }
}

async fn head_node_instance(client: &ConsoleClient, cluster: &str) -> Result<String> {
    let description = client.describe_cluster(cluster).await?;
    get_at(&description, &["headNode", "instanceId"])
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("cluster {cluster} has no running head node"))
}

async fn watch(client: &ConsoleClient, poller: &ClusterPoller<ConsoleClient>, name: &str) {
    poller.start(name);
    let mut ticks = tokio::time::interval(poller.interval());
    while poller.is_polling(name) {
        ticks.tick().await;
        let status = client.store().get_str(paths::cluster(name).join("clusterStatus"));
        let fleet = client
            .store()
            .get_str(paths::cluster(name).join("computeFleetStatus"));
        info!(
            cluster = %name,
            status = status.as_deref().unwrap_or("-"),
            fleet = fleet.as_deref().unwrap_or("-"),
            "watch"
        );
    }
}

async fn run_clusters(
    client: &ConsoleClient,
    wizard: &WizardController,
    command: ClusterCommand,
) -> Result<()> {
    match command {
        ClusterCommand::List => print_json(&client.list_clusters().await?),
        ClusterCommand::Describe { name } => {
            let description = client.describe_cluster(&name).await?;
            let version = client.get_version().await.unwrap_or_default();
            let region = client.effective_region().unwrap_or_default();
            let cluster_version = description
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let cost_monitoring =
                feature_flags::is_feature_enabled(Some(&version), Some(&region), Feature::CostMonitoring)
                    && client.get_cost_monitoring_status().await.unwrap_or(false);
            let tabs: Vec<_> = cluster_view::cluster_tabs(&description, cost_monitoring)
                .into_iter()
                .map(|tab| tab.id())
                .collect();
            let version_mismatch =
                !version.is_empty() && cluster_view::version_mismatch(&version, cluster_version);
            let ssm_enabled = cluster_view::ssm_enabled(&description, &region);
            let ssh = cluster_view::ssh_command(&description);
            print_json(&json!({
                "cluster": description,
                "tabs": tabs,
                "versionMismatch": version_mismatch,
                "ssmEnabled": ssm_enabled,
                "ssh": ssh,
            }))
        }
        ClusterCommand::Delete { name } => print_optional(client.delete_cluster(&name).await),
        ClusterCommand::Config { name } => {
            let yaml = client
                .get_configuration(&name)
                .await
                .ok_or_else(|| anyhow!("configuration of {name} is unavailable"))?;
            println!("{yaml}");
            Ok(())
        }
        ClusterCommand::Instances { name } => {
            print_optional(client.get_cluster_instances(&name).await)
        }
        ClusterCommand::Events { name } => {
            print_optional(client.get_cluster_stack_events(&name).await)
        }
        ClusterCommand::Logs { name, stream } => match stream {
            Some(stream) => {
                for event in client.list_cluster_log_events(&name, &stream).await? {
                    let at = event
                        .timestamp
                        .map(|timestamp| timestamp.to_rfc3339())
                        .unwrap_or_default();
                    println!("{at} {}", event.message);
                }
                Ok(())
            }
            None => print_json(&client.list_cluster_log_streams(&name).await?),
        },
        ClusterCommand::Fleet { name, action } => {
            let status = match action {
                FleetAction::Start => FleetStatusRequest::StartRequested,
                FleetAction::Stop => FleetStatusRequest::StopRequested,
            };
            print_optional(client.update_compute_fleet(&name, status).await)
        }
        ClusterCommand::Watch { name } => {
            watch(client, wizard.poller(), &name).await;
            print_json(&client.store().get(paths::cluster(&name)))
        }
        ClusterCommand::Create {
            name,
            file,
            version,
            dry_run,
            wait,
        } => {
            let yaml = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let version = match version {
                Some(version) => version,
                None => client.get_version().await?,
            };
            let config = template::decode_config(&yaml)?;
            client
                .load_aws_config(client.effective_region().as_deref())
                .await;
            wizard.import_template(&name, &version, config).await;
            let invalid = wizard.check_all();
            if !invalid.is_empty() {
                print_page_errors(&invalid);
                bail!("configuration is invalid");
            }

            match wizard.submit(dry_run).await {
                SubmitOutcome::Submitted(Route::ClusterDetail(name)) => {
                    println!("submitted {name}");
                    if wait {
                        watch(client, wizard.poller(), &name).await;
                        print_json(&client.store().get(paths::cluster(&name)))?;
                    }
                    Ok(())
                }
                SubmitOutcome::Submitted(route) => {
                    println!("submitted, next view: {route:?}");
                    Ok(())
                }
                SubmitOutcome::DryRunPassed => Ok(()),
                SubmitOutcome::Invalid(errors) => {
                    print_json(&errors)?;
                    bail!("configuration is invalid")
                }
                SubmitOutcome::Failed(err) => Err(err.into()),
            }
        }
        ClusterCommand::Update {
            name,
            file,
            dry_run,
            force,
        } => {
            let configuration = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let response = client
                .update_cluster(UpdateCluster {
                    name,
                    configuration,
                    version: None,
                    dry_run,
                    force_update: force,
                })
                .await?;
            print_json(&response)
        }
    }
}

/// Runs the wizard over a configuration file without contacting a backend.
fn check_template(
    client: &ConsoleClient,
    wizard: &WizardController,
    yaml: &str,
    name: Option<String>,
    vpc: Option<String>,
    version: String,
) -> Result<bool> {
    let store = client.store();
    wizard.show();
    store.set(paths::wizard_key("version"), json!(version));
    let normalized = template::normalize(
        template::decode_config(yaml)?,
        &TemplateContext::from_store(store),
    );
    let vpc_known = normalized.vpc.is_some();
    template::apply(store, normalized);
    if let Some(name) = name {
        store.set(paths::wizard_key("clusterName"), json!(name));
    }
    if let Some(vpc) = vpc.filter(|_| !vpc_known) {
        store.set(paths::wizard_key("vpc"), json!(vpc));
    }
    store.set(paths::wizard_key("clusterConfigYaml"), json!(yaml));

    let invalid = wizard.check_all();
    print_page_errors(&invalid);
    Ok(invalid.is_empty())
}

fn print_page_errors(invalid: &[(Page, PageErrors)]) {
    for (page, errors) in invalid {
        for error in &errors.fields {
            println!("{}: {}: {}", page.key(), error.field, error.message);
        }
    }
}

async fn run(client: &ConsoleClient, wizard: &WizardController, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            let (identity, version) = tokio::join!(client.get_identity(), client.get_version());
            client.load_initial_state().await;
            print_json(&json!({
                "identity": identity.ok(),
                "version": version.ok(),
                "region": client.effective_region(),
                "clusters": client.store().get(paths::cluster_list()),
                "customImages": client.store().get(paths::custom_images_list()),
            }))
        }
        Command::Clusters(command) => run_clusters(client, wizard, command).await,
        Command::Template(TemplateCommand::Check {
            file,
            name,
            vpc,
            version,
        }) => {
            let yaml = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            if !check_template(client, wizard, &yaml, name, vpc, version)? {
                bail!("{} failed validation", file.display());
            }
            println!("{} is valid", file.display());
            Ok(())
        }
        Command::Images(command) => match command {
            ImageCommand::List { status } => {
                print_optional(client.list_custom_images(status.map(Into::into), None).await)
            }
            ImageCommand::Official { version } => print_json(
                &client
                    .list_official_images(None, version.as_deref())
                    .await?,
            ),
            ImageCommand::Describe { id } => {
                print_optional(client.describe_custom_image(&id).await)
            }
            ImageCommand::Build { id, file } => {
                let configuration = fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                print_json(&client.build_image(&id, &configuration, None).await?)
            }
        },
        Command::Users(command) => match command {
            UserCommand::List => print_optional(client.list_users().await),
            UserCommand::Create { username, email } => {
                let mut user = json!({ "Username": username });
                if let Some(email) = email {
                    user["Attributes"] = json!([{ "Name": "email", "Value": email }]);
                }
                print_optional(client.create_user(&user).await)
            }
            UserCommand::Delete { username } => {
                print_optional(client.delete_user(&username).await)
            }
        },
        Command::Jobs(command) => match command {
            JobCommand::Queue { cluster, user } => {
                let instance = head_node_instance(client, &cluster).await?;
                print_optional(
                    client
                        .queue_status(&cluster, &instance, user.as_deref())
                        .await,
                )
            }
            JobCommand::Info { cluster, job_id } => {
                let instance = head_node_instance(client, &cluster).await?;
                print_json(&client.job_info(&instance, None, &job_id).await?)
            }
            JobCommand::Cancel { cluster, job_id } => {
                let instance = head_node_instance(client, &cluster).await?;
                print_optional(client.cancel_job(&instance, None, &job_id).await)
            }
        },
        Command::Instances(command) => match command {
            InstanceCommand::Start { instance_id } => print_optional(
                client
                    .ec2_action(&instance_id, InstanceAction::StartInstances)
                    .await,
            ),
            InstanceCommand::Stop { instance_id } => print_optional(
                client
                    .ec2_action(&instance_id, InstanceAction::StopInstances)
                    .await,
            ),
            InstanceCommand::Dcv { instance_id, user } => {
                print_optional(client.get_dcv_session(&instance_id, user.as_deref()).await)
            }
        },
        Command::Costs(command) => match command {
            CostCommand::Status => {
                let active = client.get_cost_monitoring_status().await?;
                print_json(&json!({ "active": active }))
            }
            CostCommand::Activate => {
                client.activate_cost_monitoring().await?;
                println!("cost monitoring activated");
                Ok(())
            }
            CostCommand::Data { cluster, from, to } => {
                if from > to {
                    bail!("--from must not be after --to");
                }
                print_json(&client.get_cost_monitoring_data(&cluster, from, to).await?)
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(api_url) = args.api_url {
        settings.api_url = api_url;
    }
    if let Some(region) = args.region {
        settings.region = Some(region);
    }
    info!(api_url = %settings.api_url, region = settings.region.as_deref().unwrap_or("-"), "console: starting");

    let store = StateTree::new();
    if let Some(region) = &settings.region {
        paths::selected_region().set(&store, region);
    }

    let client = ConsoleClient::new(&settings.api_url, store)
        .and_then(|client| client.with_timeout(settings.request_timeout()))
        .with_context(|| format!("connecting to {}", settings.api_url))?;
    let poller = ClusterPoller::with_interval(Arc::new(client.clone()), settings.poll_interval());
    let wizard = WizardController::with_poller(client.clone(), poller);

    let result = run(&client, &wizard, args.command).await;
    flush_notifications(&client);
    wizard.poller().stop_all();
    result
}
