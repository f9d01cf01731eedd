use ai_trainer_lib::config::ConfigManager;
use anyhow::bail;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

fn usage() {
    println!("ai-trainer {}", env!("CARGO_PKG_VERSION"));
    println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
    println!("Usage: ai-trainer [COMMAND]\n");
    println!("Commands:");
    println!("  serve                      Run the HTTP server (default)");
    println!("  issue-token [USER_ID]      Create a bearer token, for a new user if none is given");
    println!("  revoke-token TOKEN         Delete a bearer token");
    println!("\nOptions:");
    println!("  -h, --help       Print help");
    println!("  -V, --version    Print version");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("--version") | Some("-V") => {
            println!("ai-trainer {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help") | Some("-h") => {
            usage();
            return Ok(());
        }
        _ => {}
    }

    let mut manager = ConfigManager::new();
    let cwd = std::env::current_dir()?;
    manager.load(Some(&cwd))?;
    let config = manager.config();

    match command {
        None | Some("serve") => ai_trainer_lib::run(config).await,
        Some("issue-token") => {
            let user = args.get(2).map(|raw| Uuid::parse_str(raw)).transpose()?;
            let (user, token) = ai_trainer_lib::issue_token(config, user)?;
            println!("user_id: {}", user);
            println!("token:   {}", token);
            Ok(())
        }
        Some("revoke-token") => {
            let Some(token) = args.get(2) else {
                usage();
                bail!("revoke-token needs a TOKEN argument");
            };
            if ai_trainer_lib::revoke_token(config, token)? {
                println!("Token revoked");
            } else {
                println!("No such token");
            }
            Ok(())
        }
        Some(other) => {
            usage();
            bail!("Unknown command: {}", other)
        }
    }
}
