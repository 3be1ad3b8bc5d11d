use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use serde::Serialize;
use tuvino_client::{ApiClient, AuthSession, ClientConfig};
use tuvino_tokens::{store::FileTokenStore, UserId};

#[derive(Debug, Parser)]
#[command(name = "tuvino", about = "Talk to the TuVino backend")]
struct Opts {
    /// The backend's root URL; the API is served under `/api`
    #[arg(long, env = "TUVINO_BACKEND_URL")]
    backend_url: Option<String>,

    /// The local file used to persist the session's tokens
    #[arg(
        short = 'f',
        long,
        env = "TUVINO_TOKEN_FILE",
        value_name = "FILE",
        default_value = ".tuvino-tokens.json"
    )]
    token_file: PathBuf,

    /// Give up on a request after this many seconds
    #[arg(long, env = "TUVINO_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and store the session's tokens
    Login(Credentials),
    /// Create an account, then sign in with it
    Register(Credentials),
    /// Forget the stored tokens
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Send a GET request to an API path and print the response
    Get {
        /// The path under the API root, such as `/wines/42`
        path: String,
    },
    /// Search the catalog by name
    Search {
        /// The wine name to look for
        name: String,
    },
    /// Show a single wine
    Wine {
        /// The catalog identifier
        id: u64,
    },
    /// Show personalized recommendations
    Recommendations {
        #[command(flatten)]
        user: UserArg,
        /// How many wines to recommend
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Mark or unmark a wine as a favorite
    Favorite {
        #[command(flatten)]
        user: UserArg,
        /// The catalog identifier
        wine_id: u64,
        /// Remove the wine from favorites instead of adding it
        #[arg(long)]
        remove: bool,
    },
    /// Show favorited and tasted wines
    Status {
        #[command(flatten)]
        user: UserArg,
    },
    /// List the available preference options
    Options,
    /// Get wine suggestions for a photo of a menu
    Menu {
        #[command(flatten)]
        user: UserArg,
        /// The photo to analyze
        image: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
struct Credentials {
    /// The account's email address
    #[arg(short, long, env = "TUVINO_EMAIL")]
    email: String,

    /// The account's password
    #[arg(short, long, env = "TUVINO_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Debug, clap::Args)]
struct UserArg {
    /// Act on behalf of this user instead of the signed-in user
    #[arg(short, long = "user")]
    user_id: Option<UserId>,
}

impl UserArg {
    async fn resolve(self, session: &AuthSession) -> color_eyre::Result<UserId> {
        if let Some(user_id) = self.user_id {
            return Ok(user_id);
        }

        let user = session
            .current_user()
            .await?
            .ok_or_else(|| eyre!("not signed in; run `tuvino login` first"))?;
        user.user_id()
            .map(ToOwned::to_owned)
            .ok_or_else(|| eyre!("access token does not name a user; pass --user"))
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> color_eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();

    let mut config = match &opts.backend_url {
        Some(url) => ClientConfig::for_backend(url)?,
        None => ClientConfig::from_env()?,
    };
    if let Some(secs) = opts.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    tracing::debug!(base_url = config.base_url(), token_file = %opts.token_file.display(), "starting");

    let store = Arc::new(FileTokenStore::new(opts.token_file));
    let client = ApiClient::new(config, store)?;
    let session = AuthSession::new(client.clone());

    match opts.command {
        Command::Login(creds) => {
            let user = session.login(&creds.email, &creds.password).await?;
            match user.user_id() {
                Some(id) => println!("signed in as {id}"),
                None => println!("signed in"),
            }
        }
        Command::Register(creds) => {
            session.register(&creds.email, &creds.password).await?;
            println!("registered and signed in as {}", creds.email);
        }
        Command::Logout => {
            session.logout().await?;
            println!("signed out");
        }
        Command::Whoami => match session.current_user().await? {
            Some(user) => {
                let claims = user.claims();
                print_json(claims)?;
                if let Some(exp) = claims.expires_at() {
                    tracing::debug!(exp, "access token expiry");
                }
            }
            None => println!("not signed in"),
        },
        Command::Get { path } => print_json(&client.get(&path).await?)?,
        Command::Search { name } => print_json(&client.search_wines(&name).await?)?,
        Command::Wine { id } => print_json(&client.wine(id).await?)?,
        Command::Recommendations { user, limit } => {
            let user_id = user.resolve(&session).await?;
            print_json(&client.recommendations(&user_id, limit).await?)?;
        }
        Command::Favorite {
            user,
            wine_id,
            remove,
        } => {
            let user_id = user.resolve(&session).await?;
            client.toggle_favorite(&user_id, wine_id, remove).await?;
            if remove {
                println!("removed {wine_id} from favorites");
            } else {
                println!("added {wine_id} to favorites");
            }
        }
        Command::Status { user } => {
            let user_id = user.resolve(&session).await?;
            let status = client.wine_status(&user_id).await?;
            println!("Favorites:");
            for wine in &status.favorite_wines {
                println!("  {:>6}  {}", wine.wine_id, wine.wine_name);
            }
            println!("Tasted:");
            for rated in &status.tasted_wines {
                let rating = rated
                    .rating
                    .map(|r| format!("{r:.1}★"))
                    .unwrap_or_else(|| "unrated".to_owned());
                println!(
                    "  {:>6}  {}  {}",
                    rated.wine_id,
                    rated.wine_name.as_deref().unwrap_or("Wine"),
                    rating
                );
            }
        }
        Command::Options => print_json(&client.preference_options().await?)?,
        Command::Menu { user, image } => {
            let user_id = user.resolve(&session).await?;
            let bytes = tokio::fs::read(&image)
                .await
                .wrap_err_with(|| format!("unable to read {}", image.display()))?;
            print_json(&client.parse_menu(&user_id, &bytes).await?)?;
        }
    }

    Ok(())
}
