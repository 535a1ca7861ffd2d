// Command-line surface over the studio services
use crate::application::catalog::{ChartCatalog, DashboardCatalog};
use crate::application::defaults::{default_config, default_data, default_size, library};
use crate::application::feedback::FailureReporter;
use crate::application::render::render_widget;
use crate::application::snapshots::SnapshotLibrary;
use crate::application::studio::StudioSession;
use crate::application::team::TeamDirectory;
use crate::application::wizard::{ConnectionWizard, WizardVariant};
use crate::domain::dashboard::Dashboard;
use crate::domain::data_source::{
    build_connection_url, parse_connection_url, warehouse_connection_url, ConnectionConfig,
    FileFormat, FileUpload, SourceType,
};
use crate::domain::records::{RecordFilter, Role, Visibility};
use crate::domain::widget::WidgetKind;
use crate::infrastructure::config::StudioConfig;
use crate::infrastructure::http_backend::HttpBackend;
use crate::infrastructure::source_cache::SourceCache;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "studio")]
#[command(about = "Dashboard studio client", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (extension optional)
    #[arg(short, long, value_name = "FILE", default_value = "config/studio")]
    pub config: String,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Saved charts
    Charts {
        #[command(subcommand)]
        action: ChartCommand,
    },
    /// Saved dashboards
    Dashboards {
        #[command(subcommand)]
        action: DashboardCommand,
    },
    /// Organization members
    Members {
        #[command(subcommand)]
        action: MemberCommand,
    },
    /// Saved query snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotCommand,
    },
    /// Data source connections
    Connection {
        #[command(subcommand)]
        action: ConnectionCommand,
    },
    /// Show default config and data for a widget type, or the whole widget library
    Defaults { widget_type: Option<String> },
    /// Render every widget of a dashboard JSON file into view models
    Render { file: PathBuf },
    /// Edit a dashboard JSON file through a studio session
    Edit(EditArgs),
}

#[derive(Args)]
pub struct EditArgs {
    /// Dashboard JSON file
    file: PathBuf,
    /// Add a widget of this type below the existing ones
    #[arg(long = "add", value_name = "TYPE")]
    add: Vec<String>,
    /// Widget the form changes apply to (defaults to the last added one)
    #[arg(long)]
    widget: Option<String>,
    /// Property form change as KEY=VALUE; VALUE is read as JSON when it parses
    #[arg(long = "set", value_name = "KEY=VALUE")]
    changes: Vec<String>,
    /// Write the edited dashboard back to the file
    #[arg(long)]
    write: bool,
    /// Save the dashboard to the backend
    #[arg(long)]
    save: bool,
    /// Stay open and auto-save on the configured interval until Ctrl-C
    #[arg(long)]
    autosave: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum VisibilityArg {
    Public,
    Private,
}

#[derive(Args)]
pub struct ListArgs {
    /// Case-insensitive name search
    #[arg(short, long)]
    search: Option<String>,
    #[arg(long, value_enum)]
    visibility: Option<VisibilityArg>,
}

impl ListArgs {
    fn filter(&self) -> RecordFilter {
        RecordFilter {
            search: self.search.clone(),
            visibility: self.visibility.map(|v| match v {
                VisibilityArg::Public => Visibility::Public,
                VisibilityArg::Private => Visibility::Private,
            }),
            ..RecordFilter::default()
        }
    }
}

#[derive(Subcommand)]
pub enum ChartCommand {
    List {
        #[command(flatten)]
        list: ListArgs,
        #[arg(long)]
        status: Option<String>,
        /// Chart type, e.g. bar
        #[arg(long)]
        kind: Option<String>,
    },
    Delete { id: String },
    /// Toggle public visibility
    Share { id: String },
    Export { id: String },
    Duplicate {
        id: String,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DashboardCommand {
    List {
        #[command(flatten)]
        list: ListArgs,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum MemberCommand {
    List {
        /// Organization id (defaults to the configured one)
        #[arg(long)]
        org: Option<String>,
    },
    Role {
        user_id: String,
        role: Role,
        #[arg(long)]
        org: Option<String>,
    },
    Invite { email: String, role: Role },
}

#[derive(Subcommand)]
pub enum SnapshotCommand {
    List,
    Show { id: String },
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// Source type, e.g. postgresql, snowflake, s3, csv, api
    source_type: String,
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    database: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long, env = "STUDIO_SOURCE_PASSWORD")]
    password: Option<String>,
    /// Fill connection fields from a URL instead
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    storage_uri: Option<String>,
    #[arg(long)]
    api_url: Option<String>,
    /// Local file to upload for file sources
    #[arg(long)]
    file: Option<PathBuf>,
    /// Extra provider fields as key=value
    #[arg(long = "set", value_name = "KEY=VALUE")]
    extra: Vec<String>,
}

impl ConnectionArgs {
    fn source(&self) -> Result<SourceType> {
        SourceType::from_tag(&self.source_type)
            .with_context(|| format!("Unknown source type '{}'", self.source_type))
    }

    fn to_config(&self) -> Result<ConnectionConfig> {
        let mut config = ConnectionConfig {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            storage_uri: self.storage_uri.clone(),
            api_url: self.api_url.clone(),
            ..ConnectionConfig::default()
        };
        for pair in &self.extra {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("Expected KEY=VALUE, got '{}'", pair);
            };
            config.extra.insert(key.trim().to_string(), value.to_string());
        }
        if let Some(path) = &self.file {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            config.file = Some(FileUpload { file_name, bytes });
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum ConnectionCommand {
    /// Print the connection URL for the given fields
    Build(ConnectionArgs),
    /// Split a connection URL into its fields
    Parse { url: String },
    /// Ask the backend to test a connection
    Test(ConnectionArgs),
    /// Create the data source on the backend
    Save(ConnectionArgs),
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Everything the command handlers need.
pub struct CliContext {
    pub config: StudioConfig,
    pub backend: Arc<HttpBackend>,
    pub reporter: FailureReporter,
}

impl CliContext {
    fn organization(&self, org: Option<String>) -> Result<String> {
        org.or_else(|| self.config.organization.id.clone())
            .context("No organization id given and none configured")
    }

    fn wizard(&self) -> Result<ConnectionWizard> {
        let wizard = ConnectionWizard::new(
            WizardVariant::Single,
            self.backend.clone(),
            self.reporter.clone(),
        );
        Ok(match &self.config.studio.source_cache_path {
            Some(path) => wizard.with_store(Arc::new(SourceCache::load(path)?)),
            None => wizard,
        })
    }
}

pub async fn run(command: Commands, ctx: &CliContext) -> Result<()> {
    match command {
        Commands::Charts { action } => run_charts(action, ctx).await,
        Commands::Dashboards { action } => run_dashboards(action, ctx).await,
        Commands::Members { action } => run_members(action, ctx).await,
        Commands::Snapshots { action } => run_snapshots(action, ctx).await,
        Commands::Connection { action } => run_connection(action, ctx).await,
        Commands::Defaults { widget_type } => show_defaults(widget_type.as_deref()),
        Commands::Render { file } => render_file(&file),
        Commands::Edit(args) => run_edit(args, ctx).await,
    }
}

async fn run_charts(action: ChartCommand, ctx: &CliContext) -> Result<()> {
    let catalog = ChartCatalog::new(ctx.backend.clone(), ctx.reporter.clone());
    match action {
        ChartCommand::List { list, status, kind } => {
            catalog.refresh().await?;
            let filter = RecordFilter {
                status,
                kind,
                ..list.filter()
            };
            print_json(&catalog.visible(&filter))
        }
        ChartCommand::Delete { id } => Ok(catalog.delete(&id).await?),
        ChartCommand::Share { id } => {
            catalog.refresh().await?;
            let is_public = catalog.toggle_share(&id).await?;
            print_json(&json!({ "id": id, "is_public": is_public }))
        }
        ChartCommand::Export { id } => {
            let url = catalog.export(&id).await?;
            print_json(&json!({ "id": id, "export_url": url }))
        }
        ChartCommand::Duplicate { id, name } => {
            if name.is_none() {
                catalog.refresh().await?;
            }
            catalog.duplicate(&id, name.as_deref()).await?;
            Ok(())
        }
    }
}

async fn run_dashboards(action: DashboardCommand, ctx: &CliContext) -> Result<()> {
    let catalog = DashboardCatalog::new(ctx.backend.clone(), ctx.reporter.clone());
    match action {
        DashboardCommand::List { list } => {
            catalog.refresh().await?;
            print_json(&catalog.visible(&list.filter()))
        }
        DashboardCommand::Delete { id } => Ok(catalog.delete(&id).await?),
    }
}

async fn run_members(action: MemberCommand, ctx: &CliContext) -> Result<()> {
    let team = TeamDirectory::new(ctx.backend.clone(), ctx.reporter.clone());
    match action {
        MemberCommand::List { org } => {
            let members = team.refresh(&ctx.organization(org)?).await?;
            print_json(&members)
        }
        MemberCommand::Role { user_id, role, org } => {
            team.change_role(&ctx.organization(org)?, &user_id, role)
                .await?;
            Ok(())
        }
        MemberCommand::Invite { email, role } => Ok(team.invite(&email, role).await?),
    }
}

async fn run_snapshots(action: SnapshotCommand, ctx: &CliContext) -> Result<()> {
    let snapshots = SnapshotLibrary::new(ctx.backend.clone(), ctx.reporter.clone());
    match action {
        SnapshotCommand::List => print_json(&snapshots.list().await?),
        SnapshotCommand::Show { id } => print_json(&snapshots.load(&id).await?),
    }
}

async fn run_connection(action: ConnectionCommand, ctx: &CliContext) -> Result<()> {
    match action {
        ConnectionCommand::Build(args) => {
            let url = match args.source()? {
                SourceType::Database(dialect) => build_connection_url(dialect, &args.to_config()?),
                SourceType::Warehouse(kind) => warehouse_connection_url(kind, &args.to_config()?),
                other => bail!("{} sources have no connection URL", other.tag()),
            };
            println!("{}", url);
            Ok(())
        }
        ConnectionCommand::Parse { url } => print_json(&parse_connection_url(&url)?),
        ConnectionCommand::Test(args) => {
            let wizard = prepare_wizard(&args, ctx)?;
            wizard.test_connection().await?;
            print_json(&json!({ "status": format!("{:?}", wizard.state().status) }))
        }
        ConnectionCommand::Save(args) => {
            let wizard = prepare_wizard(&args, ctx)?;
            print_json(&wizard.save().await?)
        }
    }
}

fn prepare_wizard(args: &ConnectionArgs, ctx: &CliContext) -> Result<ConnectionWizard> {
    let mut source = args.source()?;
    let mut config = args.to_config()?;
    if let Some(path) = &args.file {
        let format = FileFormat::from_file_name(&path.to_string_lossy());
        if let (SourceType::File(_), Some(format)) = (source, format) {
            source = SourceType::File(format);
        }
    }
    if config.name.is_empty() {
        config.name = source.tag().to_string();
    }

    let wizard = ctx.wizard()?;
    wizard.select_type(source)?;
    wizard.update_config(|form| *form = config)?;
    if let Some(url) = &args.url {
        wizard.apply_connection_url(url)?;
    }
    Ok(wizard)
}

fn show_defaults(widget_type: Option<&str>) -> Result<()> {
    let Some(tag) = widget_type else {
        return print_json(&library());
    };
    if WidgetKind::from_tag(tag) == WidgetKind::Unknown {
        tracing::warn!("Unknown widget type '{}', showing the generic fallback", tag);
    }
    let (w, h) = default_size(tag);
    print_json(&json!({
        "type": tag,
        "size": { "w": w, "h": h },
        "config": default_config(tag),
        "data": default_data(tag),
    }))
}

fn read_dashboard(path: &Path) -> Result<Dashboard> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).context("Failed to parse dashboard JSON")
}

fn parse_changes(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut changes = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Expected KEY=VALUE, got '{}'", pair);
        };
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        changes.insert(key.trim().to_string(), value);
    }
    Ok(changes)
}

async fn run_edit(args: EditArgs, ctx: &CliContext) -> Result<()> {
    let session = Arc::new(StudioSession::new(
        ctx.backend.clone(),
        ctx.reporter.clone(),
        ctx.config.to_studio_settings(),
    ));
    session.open(read_dashboard(&args.file)?);

    for tag in &args.add {
        let id = session.add_widget(tag);
        tracing::info!("Added {} widget {}", tag, id);
    }

    let changes = parse_changes(&args.changes)?;
    if !changes.is_empty() {
        let target = args
            .widget
            .clone()
            .or_else(|| session.selected())
            .context("--set needs --widget or --add")?;
        if session.widget(&target).is_none() {
            bail!("No widget with id '{}'", target);
        }
        session.apply_form_changes(&target, changes);
    }
    session.flush_edits();

    if args.write {
        let body = serde_json::to_vec_pretty(&session.dashboard())?;
        std::fs::write(&args.file, body)
            .with_context(|| format!("Failed to write {}", args.file.display()))?;
    }
    if args.save {
        session.save().await?;
    }
    if args.autosave {
        let _autosave = session.spawn_autosave();
        tracing::info!(
            "Auto-saving every {}s, press Ctrl-C to stop",
            ctx.config.studio.autosave_interval_secs
        );
        tokio::signal::ctrl_c().await?;
        session.save().await?;
    }

    print_json(&session.dashboard())
}

fn render_file(path: &Path) -> Result<()> {
    let mut dashboard = read_dashboard(path)?;
    dashboard.validate()?;
    for widget in &mut dashboard.widgets {
        widget.hoist_config_data();
    }

    let views: Vec<_> = dashboard.widgets.iter().map(render_widget).collect();
    let issues: usize = views.iter().map(|v| v.issues.len()).sum();
    if issues > 0 {
        tracing::warn!("{} widget fields had an unexpected shape", issues);
    }
    print_json(&views)
}
