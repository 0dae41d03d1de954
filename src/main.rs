//! Binary entry point for the kiln CLI.

use std::env;
use std::io::{self, Write};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kiln::compute::{Image, MachineType, Zone};
use kiln::pipeline::StepFuture;
use kiln::{
    Artifact, BuildConfig, BuildFailure, Builder, CancelFlag, ClientSecrets, ComputeApi, ComputeError,
    ConfigError, CredentialsError, GceClient, GcloudToken, PauseHook, ProcessCommandRunner,
    Services, SshConnector, SshKeygen, SshSettings, StaticToken, StreamingCommandRunner,
    TokenSource, TokioClock,
};

mod cli;

use cli::{BuildCommand, Cli, InventoryCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("credentials error: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("build failed: {0}")]
    Build(#[from] BuildFailure),
    #[error("compute error: {0}")]
    Compute(#[from] ComputeError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("KILN_LOG").unwrap_or_else(|_| String::from("info")),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = BuildConfig::load_without_cli_args()?;
    match cli {
        Cli::Build(args) => run_build(&config, args).await,
        Cli::DestroyImage(args) => destroy_image(&config, &args.name).await,
        Cli::Inventory(args) => inventory(&config, args).await,
    }
}

async fn run_build(config: &BuildConfig, args: BuildCommand) -> Result<(), CliError> {
    let secrets = load_secrets(config)?;
    let derived_project = secrets.as_ref().and_then(ClientSecrets::project_id);

    let mut request_builder = config
        .request_builder(derived_project)
        .update_gsutil(config.update_gsutil || args.update_gsutil)
        .debug(config.debug || args.debug);
    for command in args.provision {
        request_builder = request_builder.provision_command(command);
    }
    for (key, value) in args.metadata {
        request_builder = request_builder.metadata(key, value);
    }
    for tag in args.tags {
        request_builder = request_builder.tag(tag);
    }
    let request = request_builder.build()?;

    let compute = compute_client(config, secrets.as_ref(), &request.project_id)?;
    let settings = SshSettings {
        ssh_bin: config.ssh_bin.clone(),
        ..SshSettings::default()
    };
    let services = Services {
        compute: Arc::new(compute),
        clock: Arc::new(TokioClock),
        connector: Arc::new(SshConnector::new(settings, StreamingCommandRunner)),
        keys: Arc::new(SshKeygen::new(&config.ssh_keygen_bin, ProcessCommandRunner)),
    };

    let unpaused = Builder::new(request, services);
    let cancel = unpaused.cancel_handle();
    let build = unpaused.with_pause(Box::new(LinePause::new(
        BufReader::new(tokio::io::stdin()),
        cancel.clone(),
    )));
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling after the current call");
            cancel.cancel();
        }
    });

    let outcome = build.run().await;
    interrupt.abort();
    let artifact = outcome?;

    for failure in artifact.cleanup_failures() {
        writeln!(io::stderr(), "warning: {failure}").ok();
    }
    writeln!(io::stdout(), "{artifact}").ok();
    Ok(())
}

async fn destroy_image(config: &BuildConfig, name: &str) -> Result<(), CliError> {
    let compute: Arc<dyn ComputeApi> = Arc::new(configured_client(config)?);
    Artifact::new(name, compute, Arc::new(TokioClock))
        .with_polling(
            Duration::from_secs(config.poll_interval_secs.max(1)),
            Duration::from_secs(config.state_timeout_secs),
        )
        .destroy()
        .await?;

    writeln!(io::stdout(), "Image {name} deleted").ok();
    Ok(())
}

async fn inventory(config: &BuildConfig, args: InventoryCommand) -> Result<(), CliError> {
    let compute = configured_client(config)?;

    let zones = compute.list_zones().await?;
    let zone = args.zone.or_else(|| config.zone.clone());
    let mut machine_types = None;
    if let Some(selected) = zone.as_deref() {
        machine_types = Some((selected, compute.list_machine_types(selected).await?));
    }

    let image_project = args
        .image_project
        .unwrap_or_else(|| config.fallback_image_project.clone());
    let mut image_sets = vec![(
        compute.project_id().to_owned(),
        compute.list_images(compute.project_id()).await?,
    )];
    if image_project != compute.project_id() {
        let images = compute.list_images(&image_project).await?;
        image_sets.push((image_project, images));
    }

    let report = render_inventory(&zones, machine_types.as_ref(), &image_sets);
    write!(io::stdout(), "{report}").ok();
    Ok(())
}

fn render_inventory(
    zones: &[Zone],
    machine_types: Option<&(&str, Vec<MachineType>)>,
    image_sets: &[(String, Vec<Image>)],
) -> String {
    let mut lines = vec![String::from("Zones:")];
    lines.extend(zones.iter().map(|zone| {
        zone.status.as_deref().map_or_else(
            || format!("  {}", zone.name),
            |status| format!("  {} ({status})", zone.name),
        )
    }));

    lines.extend(machine_types.map_or_else(
        || {
            vec![String::from(
                "Machine types: no zone selected (pass --zone or set KILN_ZONE)",
            )]
        },
        |(zone, types)| {
            let mut section = vec![format!("Machine types in {zone}:")];
            section.extend(types.iter().map(|machine_type| {
                machine_type
                    .deprecated
                    .as_ref()
                    .filter(|record| record.is_deprecated())
                    .map_or_else(
                        || format!("  {}", machine_type.name),
                        |record| format!("  {} [{}]", machine_type.name, record.state),
                    )
            }));
            section
        },
    ));

    for (project, images) in image_sets {
        lines.push(format!("Images in {project}:"));
        lines.extend(images.iter().map(|image| format!("  {}", image.name)));
    }

    let mut report = lines.join("\n");
    report.push('\n');
    report
}

fn load_secrets(config: &BuildConfig) -> Result<Option<ClientSecrets>, CliError> {
    config
        .client_secrets_path
        .as_deref()
        .filter(|path| !path.trim().is_empty())
        .map(|path| ClientSecrets::load(Utf8Path::new(path)))
        .transpose()
        .map_err(CliError::from)
}

fn configured_client(config: &BuildConfig) -> Result<GceClient, CliError> {
    let secrets = load_secrets(config)?;
    let project = config
        .project_id
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| secrets.as_ref().and_then(ClientSecrets::project_id))
        .map(str::to_owned)
        .ok_or_else(|| {
            ConfigError::Invalid(vec![String::from(
                "missing project ID: set KILN_PROJECT_ID or add project_id to kiln.toml",
            )])
        })?;
    compute_client(config, secrets.as_ref(), &project)
}

fn compute_client(
    config: &BuildConfig,
    secrets: Option<&ClientSecrets>,
    project: &str,
) -> Result<GceClient, CliError> {
    let token = access_token(config, secrets)?;
    Ok(GceClient::new(project, token).with_endpoint(&config.api_endpoint))
}

fn access_token(
    config: &BuildConfig,
    secrets: Option<&ClientSecrets>,
) -> Result<String, CredentialsError> {
    config.access_token.as_deref().map_or_else(
        || {
            let mut source = GcloudToken::new(&config.gcloud_bin, ProcessCommandRunner);
            if let Some(found) = secrets {
                source = source.for_account(found.web.client_email.clone());
            }
            source.access_token()
        },
        |token| StaticToken::new(token).access_token(),
    )
}

/// Waits for a line on `reader` between steps when debugging is enabled. One
/// reader serves every pause so buffered keystrokes carry over, and raising
/// the cancel flag releases a pending pause.
struct LinePause<R> {
    reader: Mutex<R>,
    cancel: CancelFlag,
}

impl<R> LinePause<R> {
    fn new(reader: R, cancel: CancelFlag) -> Self {
        Self {
            reader: Mutex::new(reader),
            cancel,
        }
    }
}

impl<R: AsyncBufRead + Unpin + Send> PauseHook for LinePause<R> {
    fn pause<'a>(&'a self, step: &'a str) -> StepFuture<'a, ()> {
        Box::pin(async move {
            info!(step, "Pausing after step; press Enter to continue");
            let mut reader = self.reader.lock().await;
            let mut line = String::new();
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!(step, "pause released by cancellation");
                }
                read = reader.read_line(&mut line) => {
                    if let Err(err) = read {
                        warn!(error = %err, "failed to read from stdin; continuing");
                    }
                }
            }
        })
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod main_tests;
