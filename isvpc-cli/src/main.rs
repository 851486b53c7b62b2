use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use isvpc_core::{
    Error, Generation, ObservedState, ResourceId, ResourceKind, Result, Snapshot, WaitGoal,
    lifecycle,
};
use isvpc_provider_ibm::models::{
    HttpsRedirectTarget, ListenerReference, PoolReference, RedirectTarget,
};
use isvpc_provider_ibm::{
    ListenerPolicyPatch, ListenerPolicyPrototype, PolicyRule, ProviderConfig, Session,
    create_policy, delete_policy, update_policy,
};

#[derive(Parser)]
#[command(name = "isvpc")]
#[command(about = "Drive IBM Cloud VPC resources through their lifecycle", long_about = None)]
struct Cli {
    /// Region to operate in
    #[arg(long, global = true, env = "IC_REGION")]
    region: Option<String>,

    /// VPC generation (1 or classic, 2 or gen2)
    #[arg(long, global = true, env = "IC_GENERATION")]
    generation: Option<Generation>,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List resource kinds with their lifecycle states and default timeouts
    Kinds,
    /// Print the current document of a resource, by id or by name
    Get {
        /// Resource kind (e.g. vpc, load_balancer_listener_policy)
        kind: ResourceKind,
        /// Resource id; nested resources use parent/child ids
        #[arg(required_unless_present = "name", conflicts_with = "name")]
        id: Option<String>,

        /// Look the resource up by name instead of id
        #[arg(long)]
        name: Option<String>,

        /// Parent ids for a name lookup of a nested kind (e.g. lb/listener)
        #[arg(long)]
        parent: Option<String>,
    },
    /// List resources of a kind
    List {
        kind: ResourceKind,

        /// Parent ids for nested kinds (e.g. lb/listener)
        #[arg(long)]
        parent: Option<String>,
    },
    /// Wait for a resource to reach a lifecycle goal
    Wait {
        kind: ResourceKind,
        id: String,

        /// Goal to wait for
        #[arg(long = "for", default_value = "available")]
        goal: WaitGoal,

        /// Timeout in seconds (defaults to the kind's timeout)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Delete a resource and wait until it is gone
    Delete {
        kind: ResourceKind,
        id: String,

        /// Timeout in seconds (defaults to the kind's delete timeout)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Show a bare metal server profile's bandwidth
    Profile {
        /// Profile name (e.g. bx2-metal-96x384)
        name: String,
    },
    /// Load balancer listener policy commands
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Create a listener policy
    Create {
        /// Load balancer id
        #[arg(long)]
        lb: String,

        /// Listener id
        #[arg(long)]
        listener: String,

        /// Evaluation priority (1-10)
        #[arg(long)]
        priority: u32,

        #[arg(long, value_enum)]
        action: PolicyAction,

        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        target: TargetArgs,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Change a listener policy's name, priority or target
    Update {
        /// Policy id as lb/listener/policy
        id: String,

        #[arg(long)]
        priority: Option<u32>,

        #[arg(long)]
        name: Option<String>,

        /// Action of the existing policy, needed to change its target
        #[arg(long, value_enum)]
        action: Option<PolicyAction>,

        #[command(flatten)]
        target: TargetArgs,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Delete a listener policy
    Delete {
        /// Policy id as lb/listener/policy
        id: String,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyAction {
    Forward,
    Redirect,
    HttpsRedirect,
    Reject,
}

#[derive(clap::Args, Debug, Default)]
struct TargetArgs {
    /// Pool id (forward)
    #[arg(long)]
    pool: Option<String>,

    /// Redirect URL (redirect)
    #[arg(long)]
    url: Option<String>,

    /// Target listener id (https-redirect)
    #[arg(long)]
    target_listener: Option<String>,

    /// Redirect status code (redirect, https-redirect)
    #[arg(long)]
    status_code: Option<u16>,

    /// Path to redirect to (https-redirect)
    #[arg(long)]
    uri: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Kinds => {
            run_kinds();
            Ok(())
        }
        Commands::Get {
            kind,
            id,
            name,
            parent,
        } => {
            let parents = split_parents(parent.as_deref());
            run_get(cli.region, cli.generation, kind, id, name, &parents).await
        }
        Commands::List { kind, parent } => {
            run_list(cli.region, cli.generation, kind, &split_parents(parent.as_deref())).await
        }
        Commands::Wait {
            kind,
            id,
            goal,
            timeout,
        } => run_wait(cli.region, cli.generation, kind, &id, goal, timeout).await,
        Commands::Delete { kind, id, timeout } => {
            run_delete(cli.region, cli.generation, kind, &id, timeout).await
        }
        Commands::Profile { name } => run_profile(cli.region, cli.generation, &name).await,
        Commands::Policy { command } => run_policy(cli.region, cli.generation, command).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn open_session(region: Option<String>, generation: Option<Generation>) -> Result<Session> {
    let mut config = ProviderConfig::from_env()?;
    if let Some(region) = region {
        config.region = region;
    }
    if let Some(generation) = generation {
        config.generation = generation.number();
    }
    Session::new(config)
}

fn timeout_secs(timeout: Option<u64>) -> Option<Duration> {
    timeout.map(Duration::from_secs)
}

fn split_parents(parent: Option<&str>) -> Vec<String> {
    parent
        .map(|p| p.split('/').map(str::to_string).collect())
        .unwrap_or_default()
}

fn print_json(snapshot: &Snapshot) -> Result<()> {
    let pretty = serde_json::to_string_pretty(&snapshot.body)
        .map_err(|e| Error::decode(format!("Failed to format response: {}", e)))?;
    println!("{}", pretty);
    Ok(())
}

// =============================================================================
// Resource commands
// =============================================================================

fn run_kinds() {
    for kind in ResourceKind::ALL {
        let lifecycle = lifecycle(kind);
        println!(
            "{} {}",
            kind.name().cyan().bold(),
            format!("[{}]", lifecycle.status_field.unwrap_or("no status field")).dimmed()
        );
        for goal in lifecycle.goals() {
            if let Some(states) = lifecycle.states(goal) {
                println!(
                    "  {:<10} pending: {}  target: {}  failure: {}",
                    goal.to_string(),
                    format_states(&states.pending).yellow(),
                    format_states(&states.target).green(),
                    format_states(&states.failure).red()
                );
            }
        }
        let timeouts = lifecycle.timeouts;
        println!(
            "  {:<10} create {}m, update {}m, delete {}m",
            "timeouts",
            timeouts.create.as_secs() / 60,
            timeouts.update.as_secs() / 60,
            timeouts.delete.as_secs() / 60
        );
    }
}

fn format_states<'a>(states: impl IntoIterator<Item = &'a ObservedState>) -> String {
    let names: Vec<String> = states.into_iter().map(|s| s.to_string()).collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

async fn run_get(
    region: Option<String>,
    generation: Option<Generation>,
    kind: ResourceKind,
    id: Option<String>,
    name: Option<String>,
    parents: &[String],
) -> Result<()> {
    let session = open_session(region, generation)?;
    let handler = session.handler();

    let (label, found) = match (id, name) {
        (Some(id), _) => {
            let id = ResourceId::parse(kind, &id)?;
            (id.to_string(), handler.read(&id).await?)
        }
        (None, Some(name)) => {
            let found = handler.find_by_name(kind, parents, &name).await?;
            (format!("{} named '{}'", kind, name), found)
        }
        (None, None) => return Err(Error::configuration("Either an id or --name is required")),
    };

    match found {
        Some(snapshot) => print_json(&snapshot)?,
        None => println!("{} {}", label, "not found".yellow()),
    }
    Ok(())
}

async fn run_list(
    region: Option<String>,
    generation: Option<Generation>,
    kind: ResourceKind,
    parents: &[String],
) -> Result<()> {
    let session = open_session(region, generation)?;
    let items = session.handler().list(kind, parents).await?;
    let status_field = lifecycle(kind).status_field;

    for item in &items {
        let state = item.observed_state(status_field);
        println!(
            "{}  {}  {}",
            item.identifier.cyan(),
            item.field("name").unwrap_or("-"),
            state.to_string().dimmed()
        );
    }
    println!("{} {} resource(s)", items.len(), kind);
    Ok(())
}

async fn run_wait(
    region: Option<String>,
    generation: Option<Generation>,
    kind: ResourceKind,
    id: &str,
    goal: WaitGoal,
    timeout: Option<u64>,
) -> Result<()> {
    let session = open_session(region, generation)?;
    let id = ResourceId::parse(kind, id)?;

    println!("Waiting for {} to become {}...", id, goal);
    let outcome = session
        .handler()
        .wait(&id, goal, timeout_secs(timeout))
        .await?;
    println!(
        "  {} {} is {} ({} attempt(s), {:?})",
        "✓".green(),
        id,
        outcome.state,
        outcome.attempts,
        outcome.elapsed
    );
    Ok(())
}

async fn run_delete(
    region: Option<String>,
    generation: Option<Generation>,
    kind: ResourceKind,
    id: &str,
    timeout: Option<u64>,
) -> Result<()> {
    let session = open_session(region, generation)?;
    let id = ResourceId::parse(kind, id)?;
    let options = isvpc_core::MutationOptions {
        lock: None,
        timeout: timeout_secs(timeout),
    };

    println!("{} {}", "Deleting".red().bold(), id);
    session.handler().delete(&id, options).await?;
    println!("  {} {} deleted", "✓".green(), id);
    Ok(())
}

async fn run_profile(region: Option<String>, generation: Option<Generation>, name: &str) -> Result<()> {
    let session = open_session(region, generation)?;
    let profile = session.bare_metal_server_profile(name).await?;

    println!("{}", profile.name.cyan().bold());
    if let Some(family) = &profile.family {
        println!("  family:    {}", family);
    }
    let bandwidth = serde_json::to_string(&profile.bandwidth)
        .map_err(|e| Error::decode(format!("Failed to format bandwidth: {}", e)))?;
    println!("  bandwidth: {}", bandwidth);
    match profile.bandwidth.default_value() {
        Some(default) => println!("  default:   {} Mbps", default),
        None => println!("  default:   {}", "depends on configuration".dimmed()),
    }
    Ok(())
}

// =============================================================================
// Listener policy commands
// =============================================================================

fn build_rule(action: PolicyAction, target: TargetArgs) -> Result<PolicyRule> {
    let missing = |flag: &str, action: &str| {
        Error::configuration(format!("--{} is required for a {} policy", flag, action))
    };

    Ok(match action {
        PolicyAction::Forward => PolicyRule::Forward(PoolReference {
            id: target.pool.ok_or_else(|| missing("pool", "forward"))?,
            name: None,
        }),
        PolicyAction::Redirect => PolicyRule::Redirect(RedirectTarget {
            url: target.url.ok_or_else(|| missing("url", "redirect"))?,
            http_status_code: target
                .status_code
                .ok_or_else(|| missing("status-code", "redirect"))?,
        }),
        PolicyAction::HttpsRedirect => PolicyRule::HttpsRedirect(HttpsRedirectTarget {
            listener: ListenerReference {
                id: target
                    .target_listener
                    .ok_or_else(|| missing("target-listener", "https-redirect"))?,
            },
            http_status_code: target
                .status_code
                .ok_or_else(|| missing("status-code", "https-redirect"))?,
            uri: target.uri,
        }),
        PolicyAction::Reject => PolicyRule::Reject,
    })
}

async fn run_policy(
    region: Option<String>,
    generation: Option<Generation>,
    command: PolicyCommands,
) -> Result<()> {
    match command {
        PolicyCommands::Create {
            lb,
            listener,
            priority,
            action,
            name,
            target,
            timeout,
        } => {
            let mut prototype = ListenerPolicyPrototype::new(priority, build_rule(action, target)?);
            if let Some(name) = name {
                prototype = prototype.with_name(name);
            }
            prototype.validate()?;

            let session = open_session(region, generation)?;
            println!(
                "{} {} policy on {}/{}",
                "Creating".green().bold(),
                prototype.rule.action(),
                lb,
                listener
            );
            let (id, policy) = create_policy(
                &session.handler(),
                &lb,
                &listener,
                &prototype,
                timeout_secs(timeout),
            )
            .await?;
            println!(
                "  {} {} (priority {}, {})",
                "✓".green(),
                id.identifier(),
                policy.priority,
                policy.provisioning_status.as_deref().unwrap_or("unknown")
            );
        }
        PolicyCommands::Update {
            id,
            priority,
            name,
            action,
            target,
            timeout,
        } => {
            let rule = match action {
                Some(action) => Some(build_rule(action, target)?),
                None => None,
            };
            let patch = ListenerPolicyPatch {
                name,
                priority,
                rule,
            };
            patch.validate()?;

            let session = open_session(region, generation)?;
            let id = ResourceId::parse(ResourceKind::LoadBalancerListenerPolicy, &id)?;
            println!("{} {}", "Updating".yellow().bold(), id);
            let policy = update_policy(&session.handler(), &id, &patch, timeout_secs(timeout)).await?;
            println!("  {} {} (priority {})", "✓".green(), id.identifier(), policy.priority);
        }
        PolicyCommands::Delete { id, timeout } => {
            let session = open_session(region, generation)?;
            let id = ResourceId::parse(ResourceKind::LoadBalancerListenerPolicy, &id)?;
            println!("{} {}", "Deleting".red().bold(), id);
            delete_policy(&session.handler(), &id, timeout_secs(timeout)).await?;
            println!("  {} {} deleted", "✓".green(), id.identifier());
        }
    }
    Ok(())
}
