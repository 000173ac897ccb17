//! CLI commands

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand, ValueEnum};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use veridia_client::{
    AdminApplicationQuery, ApiClient, ApiClientBuilder, ApplicationQuery, ApplicationStatus,
    ApplicationSubmission, ClientConfig, ClientError, Credentials, Envelope, FileBackend,
    FileUpload, KeyValueSessionStore, Navigator, RegisterRequest, Route, SessionState,
    StatusUpdate, UserType,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Show the stored session and where the portal would start
    Status,

    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "VERIDIA_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log out and forget the stored session
    Logout,

    /// Create a new account
    Register(RegisterArgs),

    /// Fetch the profile of the logged-in user
    Profile,

    /// Applicant operations on your own applications
    Applications {
        #[command(subcommand)]
        command: ApplicantCommands,
    },

    /// Admin console operations
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// List departments
    Departments,

    /// List open positions
    Positions,
}

#[derive(Args)]
pub struct RegisterArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "VERIDIA_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long)]
    first_name: String,

    #[arg(long)]
    last_name: String,

    #[arg(long, default_value = "")]
    phone: String,

    #[arg(long, value_enum, default_value = "applicant")]
    account_type: AccountType,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum AccountType {
    Applicant,
    Admin,
}

impl From<AccountType> for UserType {
    fn from(account_type: AccountType) -> Self {
        match account_type {
            AccountType::Applicant => UserType::Applicant,
            AccountType::Admin => UserType::Admin,
        }
    }
}

#[derive(Subcommand)]
pub enum ApplicantCommands {
    /// Dashboard counters
    Stats,

    /// List your applications
    List {
        #[arg(long)]
        status: Option<ApplicationStatus>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Show one application
    Show { id: u64 },

    /// Submit a new application
    Submit {
        #[arg(long)]
        position: String,
        #[arg(long)]
        department: String,
        /// Resume file to upload
        #[arg(long)]
        resume: PathBuf,
        /// Extra form field as key=value (repeatable)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Withdraw an application
    Withdraw { id: u64 },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Dashboard counters
    Stats,

    /// List and filter applications
    List {
        #[arg(long)]
        status: Option<ApplicationStatus>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
        /// Sort field, prefix with '-' for descending
        #[arg(long)]
        ordering: Option<String>,
    },

    /// Show one application
    Show { id: u64 },

    /// Move an application to a new status
    SetStatus {
        id: u64,
        status: ApplicationStatus,
        #[arg(long)]
        interview_date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },

    /// Delete an application
    Delete { id: u64 },

    /// Analytics aggregates
    Analytics,

    /// Recent activity feed
    Activity {
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Upcoming interviews
    Interviews,
}

/// Tells the user to log in again when the session is torn down
struct CliNavigator;

impl Navigator for CliNavigator {
    fn navigate(&self, route: Route) {
        if route == Route::Login {
            eprintln!("Your session has expired. Run `veridia login` to sign in again.");
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn build_client(settings: &ClientConfig, data_dir: PathBuf) -> Result<ApiClient> {
    let store = KeyValueSessionStore::new(FileBackend::in_dir(data_dir));
    ApiClientBuilder::from_config(settings)
        .store(Arc::new(store))
        .navigator(Arc::new(CliNavigator))
        .build()
        .context("building API client")
}

fn print_envelope(envelope: &Envelope) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    if envelope.success {
        Ok(())
    } else {
        bail!("{}", envelope.error_message().unwrap_or("request was not successful"))
    }
}

fn api_error(err: ClientError) -> anyhow::Error {
    anyhow!(err.user_message())
}

fn require_role(session: &SessionState, role: UserType) -> Result<()> {
    match session.role() {
        Some(current) if current == role => Ok(()),
        Some(current) => {
            bail!("this command needs an {role} account, you are logged in as {current}")
        }
        None => bail!("not logged in, run `veridia login` first"),
    }
}

impl Commands {
    pub async fn execute(self, settings: ClientConfig, data_dir: PathBuf) -> Result<()> {
        let client = build_client(&settings, data_dir)?;

        match self {
            Commands::Status => {
                let session = client.session();
                match session.user() {
                    Some(user) => println!(
                        "Logged in as {} <{}> ({})",
                        user.full_name(),
                        user.email,
                        user.user_type
                    ),
                    None => println!("Not logged in"),
                }
                println!("Start screen: {}", session.entry_route());
                Ok(())
            }
            Commands::Login { email, password } => {
                let envelope = client
                    .login(&Credentials::new(email, password))
                    .await
                    .map_err(api_error)?;
                if !envelope.success {
                    bail!("{}", envelope.error_message().unwrap_or("login failed"));
                }
                let session = client.session();
                if let Some(user) = session.user() {
                    info!(user_type = %user.user_type, "Login stored");
                    println!("Logged in as {} ({})", user.email, user.user_type);
                }
                Ok(())
            }
            Commands::Logout => {
                client.logout().await;
                println!("Logged out");
                Ok(())
            }
            Commands::Register(args) => {
                let request = RegisterRequest {
                    email: args.email,
                    password_confirm: args.password.clone(),
                    password: args.password,
                    first_name: args.first_name,
                    last_name: args.last_name,
                    phone: args.phone,
                    user_type: args.account_type.into(),
                };
                let envelope = client.register(&request).await.map_err(api_error)?;
                print_envelope(&envelope)
            }
            Commands::Profile => {
                let envelope = client.profile().await.map_err(api_error)?;
                print_envelope(&envelope)
            }
            Commands::Applications { command } => {
                require_role(&client.session(), UserType::Applicant)?;
                command.execute(&client).await
            }
            Commands::Admin { command } => {
                require_role(&client.session(), UserType::Admin)?;
                command.execute(&client).await
            }
            Commands::Departments => {
                print_envelope(&client.departments().await.map_err(api_error)?)
            }
            Commands::Positions => print_envelope(&client.positions().await.map_err(api_error)?),
        }
    }
}

impl ApplicantCommands {
    async fn execute(self, client: &ApiClient) -> Result<()> {
        let envelope = match self {
            ApplicantCommands::Stats => client.applicant_dashboard_stats().await,
            ApplicantCommands::List {
                status,
                page,
                page_size,
            } => {
                let query = ApplicationQuery {
                    status,
                    page,
                    page_size,
                };
                client.applicant_applications(&query).await
            }
            ApplicantCommands::Show { id } => client.applicant_application(id).await,
            ApplicantCommands::Submit {
                position,
                department,
                resume,
                fields,
            } => {
                let submission = ApplicationSubmission {
                    position,
                    department,
                    fields: fields.into_iter().collect::<BTreeMap<_, _>>(),
                    resume: read_upload(&resume)?,
                };
                client.submit_application(&submission).await
            }
            ApplicantCommands::Withdraw { id } => client.withdraw_application(id).await,
        }
        .map_err(api_error)?;

        print_envelope(&envelope)
    }
}

impl AdminCommands {
    async fn execute(self, client: &ApiClient) -> Result<()> {
        let envelope: Envelope<Value> = match self {
            AdminCommands::Stats => client.admin_dashboard_stats().await,
            AdminCommands::List {
                status,
                department,
                position,
                search,
                page,
                page_size,
                ordering,
            } => {
                let query = AdminApplicationQuery {
                    status,
                    department,
                    position,
                    search,
                    page,
                    page_size,
                    ordering,
                };
                client.admin_applications(&query).await
            }
            AdminCommands::Show { id } => client.admin_application(id).await,
            AdminCommands::SetStatus {
                id,
                status,
                interview_date,
                notes,
                comment,
            } => {
                if status == ApplicationStatus::InterviewScheduled && interview_date.is_none() {
                    bail!("--interview-date is required when scheduling an interview");
                }
                let update = StatusUpdate {
                    status,
                    interview_date,
                    notes,
                    comment,
                };
                client.update_application_status(id, &update).await
            }
            AdminCommands::Delete { id } => client.delete_application(id).await,
            AdminCommands::Analytics => client.analytics().await,
            AdminCommands::Activity { limit } => client.recent_activity(limit).await,
            AdminCommands::Interviews => client.upcoming_interviews().await,
        }
        .map_err(api_error)?;

        print_envelope(&envelope)
    }
}

fn read_upload(path: &std::path::Path) -> Result<FileUpload> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} is not a file", path.display()))?;
    let content_type = match path.extension().and_then(|ext| ext.to_str()) {
        Some("pdf") => Some("application/pdf".to_string()),
        Some("doc") => Some("application/msword".to_string()),
        Some("docx") => Some(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
        ),
        _ => None,
    };

    Ok(FileUpload {
        file_name,
        content_type,
        bytes,
    })
}
