use oauth_cache::{AuthError, Authenticator, Provider};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    message: String,
    exit_code: i32,
}

impl CliError {
    fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    fn usage(message: impl Into<String>) -> Self {
        Self::new(message, 2)
    }
}

impl From<AuthError> for CliError {
    fn from(err: AuthError) -> Self {
        Self::new(format!("{} (status {})", err, err.status()), 1)
    }
}

type CliResult<T> = Result<T, CliError>;

const USAGE: &str = "usage: oauth-cache <qwen|gemini> <token|api-base|status [--json]>";

#[derive(Debug)]
enum CliCommand {
    Help,
    Token(Provider),
    ApiBase(Provider),
    Status { provider: Provider, json: bool },
}

impl CliCommand {
    fn parse(args: &[String]) -> CliResult<Self> {
        let Some(first) = args.first() else {
            return Ok(Self::Help);
        };
        if matches!(first.as_str(), "-h" | "--help" | "help") {
            return Ok(Self::Help);
        }

        let provider = Provider::parse(first)
            .ok_or_else(|| CliError::usage(format!("unknown provider: {}", first)))?;
        let Some(action) = args.get(1) else {
            return Err(CliError::usage(USAGE));
        };

        match action.as_str() {
            "token" => {
                if args.len() != 2 {
                    return Err(CliError::usage("usage: oauth-cache <provider> token"));
                }
                Ok(Self::Token(provider))
            }
            "api-base" => {
                if args.len() != 2 {
                    return Err(CliError::usage("usage: oauth-cache <provider> api-base"));
                }
                Ok(Self::ApiBase(provider))
            }
            "status" => match &args[2..] {
                [] => Ok(Self::Status {
                    provider,
                    json: false,
                }),
                [flag] if flag == "--json" => Ok(Self::Status {
                    provider,
                    json: true,
                }),
                _ => Err(CliError::usage(
                    "usage: oauth-cache <provider> status [--json]",
                )),
            },
            _ => Err(CliError::usage(format!("unknown command: {}", action))),
        }
    }
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("oauth-cache: {}", err.message);
        std::process::exit(err.exit_code);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> CliResult<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match CliCommand::parse(&args)? {
        CliCommand::Help => {
            print_usage();
            Ok(())
        }
        CliCommand::Token(provider) => {
            let token = Authenticator::from_env(provider).get_access_token()?;
            println!("{}", token);
            Ok(())
        }
        CliCommand::ApiBase(provider) => {
            println!("{}", Authenticator::from_env(provider).get_api_base());
            Ok(())
        }
        CliCommand::Status { provider, json } => {
            print_status(&Authenticator::from_env(provider), json)
        }
    }
}

fn print_usage() {
    let providers = Provider::ALL
        .iter()
        .map(|provider| provider.name())
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "oauth-cache - cached OAuth bearer tokens for CLI-issued credentials\n\n\
         Usage:\n\
           oauth-cache <provider> token           Print a valid access token, refreshing if needed\n\
           oauth-cache <provider> api-base        Print the API base for the provider\n\
           oauth-cache <provider> status [--json] Show stored credential state (no network)\n\
           oauth-cache help                       Show this help\n\n\
         Providers: {}",
        providers
    );
}

fn print_status(auth: &Authenticator, json: bool) -> CliResult<()> {
    let status = auth.status();
    if json {
        let encoded = serde_json::to_string_pretty(&status)
            .map_err(|err| CliError::new(format!("failed to encode status: {}", err), 1))?;
        println!("{}", encoded);
        return Ok(());
    }

    println!("Provider:      {}", status.provider);
    println!("Credentials:   {}", status.credential_path);
    if !status.credentials_found {
        println!("State:         not found");
        return Ok(());
    }
    let yes_no = |value: bool| if value { "yes" } else { "no" };
    println!("Access token:  {}", yes_no(status.has_access_token));
    println!("Refresh token: {}", yes_no(status.has_refresh_token));
    println!(
        "Expires:       {} ({})",
        status.expires_at.as_deref().unwrap_or("--"),
        status.key_remaining
    );
    println!(
        "State:         {}",
        if status.expired { "refresh needed" } else { "valid" }
    );
    println!("API base:      {}", status.api_base);
    Ok(())
}
