pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use uuid::Uuid;
use wsgate_core::ToggleAction;

#[derive(Debug, Parser)]
#[command(
    name = "wsgate",
    about = "Workspace gateway control CLI",
    long_about = "Connect team workspaces to the Central Gateway or isolate them, and provision, check, and tear down workspaces.",
    after_help = "Examples:\n  wsgate enable team_1_dev\n  wsgate disable team_1_dev\n  wsgate provision --selection-key 3 --team \"Team 1\" --env dev\n  wsgate doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Set LLM_GATEWAY_URL in the workspace .env and restart the workspace")]
    Enable {
        #[arg(help = "Workspace identifier (`<team>_<env>` slug)")]
        workspace: String,
    },
    #[command(about = "Remove LLM_GATEWAY_URL from the workspace .env and restart the workspace")]
    Disable {
        #[arg(help = "Workspace identifier (`<team>_<env>` slug)")]
        workspace: String,
    },
    #[command(about = "Report whether a workspace is connected to the gateway")]
    Status { workspace: String },
    #[command(about = "List registered workspaces with their ports, prefixes and gateway state")]
    List,
    #[command(about = "Plan, scaffold and register a team/environment workspace")]
    Provision {
        #[arg(long, help = "Key of the chosen provisioning option")]
        selection_key: i64,
        #[arg(long, help = "Team name (free text, slugified)")]
        team: String,
        #[arg(long = "env", help = "Environment token such as dev, qa or prod")]
        environment: String,
        #[arg(long, default_value = "python", help = "Runtime tag; selects the container port")]
        runtime: String,
        #[arg(long, help = "Host port; allocated from the environment default when omitted")]
        port: Option<u16>,
        #[arg(long, help = "Start the compose project after provisioning")]
        up: bool,
    },
    #[command(about = "Verify the files a workspace needs and record the result")]
    Check { workspace: String },
    #[command(about = "Stop a workspace and remove it from the registry")]
    Teardown {
        workspace: String,
        #[arg(long, help = "Also delete the workspace directory")]
        purge: bool,
    },
    #[command(about = "Apply pending registry migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Validate config, registry connectivity, workspaces root and gateway reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Enable { .. } => "enable",
            Self::Disable { .. } => "disable",
            Self::Status { .. } => "status",
            Self::List => "list",
            Self::Provision { .. } => "provision",
            Self::Check { .. } => "check",
            Self::Teardown { .. } => "teardown",
            Self::Migrate => "migrate",
            Self::Config => "config",
            Self::Doctor { .. } => "doctor",
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    logging::init();

    let correlation_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "wsgate",
        command = cli.command.name(),
        correlation_id = %correlation_id
    );
    let _entered = span.enter();

    let result = match cli.command {
        Command::Enable { workspace } => commands::toggle::run(ToggleAction::Enable, &workspace),
        Command::Disable { workspace } => commands::toggle::run(ToggleAction::Disable, &workspace),
        Command::Status { workspace } => commands::status::run(&workspace),
        Command::List => commands::list::run(),
        Command::Provision { selection_key, team, environment, runtime, port, up } => {
            commands::provision::run(commands::provision::ProvisionArgs {
                selection_key,
                team,
                environment,
                runtime,
                host_port: port,
                up,
            })
        }
        Command::Check { workspace } => commands::check::run(&workspace),
        Command::Teardown { workspace, purge } => commands::teardown::run(&workspace, purge),
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
