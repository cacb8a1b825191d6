use anyhow::{Context, Result};
use catalog_metadata::config::{AppConfig, CliConfig, FileConfig};
use catalog_metadata::metadata::{EntityOutcome, MetadataEngine, SidecarMode, StoreSelection};
use catalog_metadata::metadata_store::{
    EntityId, MetadataStore, NewAttribute, Snapshot, SqliteMetadataStore, Target,
};
use catalog_metadata::settings::SqliteSettingsStore;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli_style;

use cli_style::{
    get_prompt, get_styles, print_command_echo, print_empty_list, print_error, print_goodbye,
    print_help, print_key_value, print_list_item, print_section_footer, print_section_header,
    print_success, print_warning, print_welcome, CommandHelp, TableBuilder,
};

use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles=get_styles())]
struct CliArgs {
    /// Path to the SQLite metadata database.
    #[clap(value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// TOML config file, its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Maximum number of undo steps kept in memory.
    #[clap(long)]
    pub undo_depth: Option<usize>,

    #[clap(long, value_enum)]
    pub sidecar_mode: Option<SidecarMode>,

    /// Default log directive when LOG_LEVEL is not set.
    #[clap(long)]
    pub log_level: Option<String>,

    /// Execute a single command and exit instead of starting the prompt.
    #[clap(long, short = 'c')]
    pub command: Option<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            log_level: self.log_level.clone(),
            undo_depth: self.undo_depth,
            sidecar_mode: self.sidecar_mode,
        }
    }
}

#[derive(Parser)]
#[command(styles=get_styles(), name = "", disable_help_subcommand = true)]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Lists the registered attribute keys in display order.
    Keys,

    /// Registers a new attribute key.
    Register {
        tag_name: String,
        name: String,
        #[clap(long)]
        internal: bool,
        #[clap(long)]
        hidden: bool,
        #[clap(long)]
        private: bool,
        #[clap(long, default_value_t = 0)]
        order: i64,
    },

    /// Changes the display order of a registered key.
    Order { tag_name: String, display_order: i64 },

    /// Creates a new entity with the given filename.
    AddEntity { filename: String },

    /// Replaces the selection with the given entity ids.
    Select { ids: Vec<i64> },

    /// Sets the hovered entity, omit the id to clear it.
    Hover { id: Option<i64> },

    /// Attaches a tag to an entity.
    Tag { id: i64, tag_name: String },

    /// Adds a color label (0-4) to an entity.
    Label { id: i64, color: i32 },

    /// Sets the rating (-1 for rejected) of an entity.
    Rating { id: i64, rating: i32 },

    /// Sets one attribute. Without --id, applies to the hovered entity or the
    /// selection.
    Set {
        key: String,
        value: String,
        #[clap(long)]
        id: Option<i64>,
        /// Do not record the change for undo.
        #[clap(long)]
        no_undo: bool,
    },

    /// Reads the values of a key, generic or virtual. Without --id, reads the
    /// selection.
    Get {
        key: String,
        #[clap(long)]
        id: Option<i64>,
        #[clap(long)]
        json: bool,
    },

    /// Shows every attribute of an entity.
    Show {
        id: i64,
        #[clap(long)]
        json: bool,
    },

    /// Removes every visible, non-internal attribute.
    Clear { ids: Vec<i64> },

    /// Removes one attribute.
    Remove {
        key: String,
        #[clap(long)]
        id: Option<i64>,
    },

    /// Reverts the last metadata change.
    Undo,

    /// Reapplies the last undone change.
    Redo,

    /// Prints the database location.
    Where,

    /// Shows this help.
    Help,

    /// Closes this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

struct Session {
    engine: MetadataEngine,
    store: Arc<SqliteMetadataStore>,
    selection: Arc<StoreSelection>,
    db_path: PathBuf,
}

impl Session {
    fn open(config: &AppConfig) -> Result<Self> {
        let store = Arc::new(
            SqliteMetadataStore::new(&config.db_path)
                .with_context(|| format!("Failed to open database {:?}", config.db_path))?,
        );
        let settings = Arc::new(SqliteSettingsStore::new(store.connection()));
        let selection = Arc::new(StoreSelection::new(store.clone()));
        let engine = MetadataEngine::new(
            store.clone(),
            settings,
            selection.clone(),
            config.engine_options(),
        )?;
        Ok(Self {
            engine,
            store,
            selection,
            db_path: config.db_path.clone(),
        })
    }

    /// Explicit ids, or the entities the current hover and selection point at.
    fn targets(&self, ids: &[i64]) -> Result<Vec<EntityId>> {
        if ids.is_empty() {
            return self.engine.act_on();
        }
        Ok(ids.iter().copied().map(EntityId).collect())
    }

    fn existing(&self, id: i64) -> Result<EntityId, String> {
        let entity = EntityId(id);
        match self.store.entity_exists(entity) {
            Ok(true) => Ok(entity),
            Ok(false) => Err(format!("Entity {} not found.", id)),
            Err(err) => Err(format!("{:#}", err)),
        }
    }
}

fn print_outcomes(outcomes: &[(EntityId, EntityOutcome)]) {
    if outcomes.is_empty() {
        print_warning("Nothing to do.");
        return;
    }
    for (entity, outcome) in outcomes {
        match outcome {
            EntityOutcome::Updated => print_success(&format!("Entity {} updated", entity)),
            EntityOutcome::Unchanged => print_list_item(&format!("Entity {} unchanged", entity)),
            EntityOutcome::Skipped => print_warning(&format!("Entity {} skipped", entity)),
            EntityOutcome::Failed(reason) => {
                print_error(&format!("Entity {} failed: {}", entity, reason))
            }
        }
    }
}

fn command_help() -> Vec<CommandHelp> {
    vec![
        CommandHelp { name: "keys", args: "", description: "List registered keys" },
        CommandHelp { name: "register", args: "<tag> <name> [--internal] [--hidden] [--private] [--order N]", description: "Register a key" },
        CommandHelp { name: "order", args: "<tag> <order>", description: "Change display order" },
        CommandHelp { name: "add-entity", args: "<filename>", description: "Create an entity" },
        CommandHelp { name: "select", args: "[ids...]", description: "Replace the selection" },
        CommandHelp { name: "hover", args: "[id]", description: "Set or clear the hovered entity" },
        CommandHelp { name: "tag", args: "<id> <tag>", description: "Attach a tag" },
        CommandHelp { name: "label", args: "<id> <color>", description: "Add a color label" },
        CommandHelp { name: "rating", args: "<id> <rating>", description: "Set the rating" },
        CommandHelp { name: "set", args: "<key> <value> [--id N] [--no-undo]", description: "Set an attribute" },
        CommandHelp { name: "get", args: "<key> [--id N] [--json]", description: "Read a key" },
        CommandHelp { name: "show", args: "<id> [--json]", description: "Show all attributes" },
        CommandHelp { name: "clear", args: "[ids...]", description: "Clear user attributes" },
        CommandHelp { name: "remove", args: "<key> [--id N]", description: "Remove one attribute" },
        CommandHelp { name: "undo", args: "", description: "Revert the last change" },
        CommandHelp { name: "redo", args: "", description: "Reapply the last undone change" },
        CommandHelp { name: "where", args: "", description: "Print the database path" },
        CommandHelp { name: "help", args: "", description: "Show this help" },
        CommandHelp { name: "exit", args: "", description: "Quit" },
    ]
}

fn execute_command(line: String, session: &Session) -> CommandExecutionResult {
    let Some(args) = shlex::split(&line) else {
        return CommandExecutionResult::Error("Unbalanced quotes.".to_string());
    };
    if args.is_empty() {
        return CommandExecutionResult::Ok;
    }
    match InnerCli::try_parse_from(std::iter::once(" ".to_string()).chain(args)) {
        Ok(cli) => match run(cli.command, session) {
            Ok(result) => result,
            Err(err) => CommandExecutionResult::Error(format!("{:#}", err)),
        },
        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
            CommandExecutionResult::Ok
        }
    }
}

fn run(command: InnerCommand, session: &Session) -> Result<CommandExecutionResult> {
    let engine = &session.engine;
    match command {
        InnerCommand::Keys => {
            let mut table = TableBuilder::new(&["Key", "Tag name", "Name", "Order", "Flags"]);
            for definition in engine.registry().definitions() {
                let mut flags = Vec::new();
                if definition.internal {
                    flags.push("internal");
                }
                if !definition.visible {
                    flags.push("hidden");
                }
                if definition.private {
                    flags.push("private");
                }
                table.add_row(vec![
                    definition.key.to_string(),
                    definition.tag_name,
                    definition.name,
                    definition.display_order.to_string(),
                    flags.join(","),
                ]);
            }
            if table.is_empty() {
                print_empty_list("No keys registered");
            } else {
                table.print();
            }
        }
        InnerCommand::Register {
            tag_name,
            name,
            internal,
            hidden,
            private,
            order,
        } => {
            let mut attribute = NewAttribute::new(tag_name.clone(), name).with_display_order(order);
            if internal {
                attribute = attribute.internal();
            }
            if hidden {
                attribute = attribute.hidden();
            }
            if private {
                attribute = attribute.private();
            }
            let key = engine.registry().add(attribute)?;
            engine.registry().sort();
            print_success(&format!("Registered {} as key {}", tag_name, key));
        }
        InnerCommand::Order {
            tag_name,
            display_order,
        } => {
            let Some(definition) = engine.registry().by_tag_name(&tag_name) else {
                return Ok(CommandExecutionResult::Error(format!(
                    "Unknown key {}.",
                    tag_name
                )));
            };
            engine
                .registry()
                .set_display_order(definition.key, display_order)?;
            print_success(&format!("{} now at position {}", tag_name, display_order));
        }
        InnerCommand::AddEntity { filename } => {
            let entity = session.store.insert_entity(&filename)?;
            print_success(&format!("Created entity {} for {}", entity, filename));
        }
        InnerCommand::Select { ids } => {
            let entities: Vec<EntityId> = ids.into_iter().map(EntityId).collect();
            session.selection.select(&entities)?;
            print_success(&format!("{} entities selected", entities.len()));
        }
        InnerCommand::Hover { id } => {
            session.selection.set_hovered(id.map(EntityId));
            match id {
                Some(id) => print_success(&format!("Hovering entity {}", id)),
                None => print_success("Hover cleared"),
            }
        }
        InnerCommand::Tag { id, tag_name } => {
            let entity = match session.existing(id) {
                Ok(entity) => entity,
                Err(err) => return Ok(CommandExecutionResult::Error(err)),
            };
            session.store.attach_tag(entity, &tag_name)?;
            print_success(&format!("Tagged entity {} with {}", entity, tag_name));
        }
        InnerCommand::Label { id, color } => {
            if !(0..=4).contains(&color) {
                return Ok(CommandExecutionResult::Error(
                    "Color label must be between 0 and 4.".to_string(),
                ));
            }
            let entity = match session.existing(id) {
                Ok(entity) => entity,
                Err(err) => return Ok(CommandExecutionResult::Error(err)),
            };
            session.store.add_color_label(entity, color)?;
            print_success(&format!("Added color label {} to entity {}", color, entity));
        }
        InnerCommand::Rating { id, rating } => {
            if !(-1..=5).contains(&rating) {
                return Ok(CommandExecutionResult::Error(
                    "Rating must be between -1 and 5.".to_string(),
                ));
            }
            let entity = match session.existing(id) {
                Ok(entity) => entity,
                Err(err) => return Ok(CommandExecutionResult::Error(err)),
            };
            let current = session
                .store
                .entity_flags(Target::Entity(entity))?
                .first()
                .copied()
                .unwrap_or(0);
            let flags = (current & !0x7) | i64::from(rating + 1);
            session.store.set_entity_flags(entity, flags)?;
            print_success(&format!("Entity {} rated {}", entity, rating));
        }
        InnerCommand::Set {
            key,
            value,
            id,
            no_undo,
        } => {
            let report = engine.set(id.map(EntityId), &key, &value, !no_undo)?;
            print_outcomes(&report.outcomes);
        }
        InnerCommand::Get { key, id, json } => {
            let target = Target::from_entity(id.map(EntityId));
            let values = engine.get(target, &key)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else {
                print_section_header(&key);
                let strings = values.to_strings();
                if strings.is_empty() {
                    print_empty_list("No values");
                }
                for value in strings {
                    print_list_item(&value);
                }
                print_section_footer();
            }
        }
        InnerCommand::Show { id, json } => {
            let entity = match session.existing(id) {
                Ok(entity) => entity,
                Err(err) => return Ok(CommandExecutionResult::Error(err)),
            };
            let snapshot = engine.snapshot(entity)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(session, entity, &snapshot);
            }
        }
        InnerCommand::Clear { ids } => {
            let entities = session.targets(&ids)?;
            let report = engine.clear(&entities, true);
            print_outcomes(&report.outcomes);
        }
        InnerCommand::Remove { key, id } => {
            let Some(key_id) = engine.registry().key_id_by_prefix(&key) else {
                return Ok(CommandExecutionResult::Error(format!("Unknown key {}.", key)));
            };
            let entities = session.targets(&id.into_iter().collect::<Vec<_>>())?;
            let report = engine.remove_keys(&entities, &[key_id], true);
            print_outcomes(&report.outcomes);
        }
        InnerCommand::Undo => {
            if !engine.can_undo() {
                print_warning("Nothing to undo.");
            } else {
                let touched = engine.undo();
                print_success(&format!("Undone, {} entities touched", touched.len()));
            }
        }
        InnerCommand::Redo => {
            if !engine.can_redo() {
                print_warning("Nothing to redo.");
            } else {
                let touched = engine.redo();
                print_success(&format!("Redone, {} entities touched", touched.len()));
            }
        }
        InnerCommand::Where => {
            print_key_value("Database", &session.db_path.display().to_string());
        }
        InnerCommand::Help => print_help(&command_help()),
        InnerCommand::Exit => return Ok(CommandExecutionResult::Exit),
    }
    Ok(CommandExecutionResult::Ok)
}

fn print_snapshot(session: &Session, entity: EntityId, snapshot: &Snapshot) {
    print_section_header(&format!("Entity {}", entity));
    if snapshot.is_empty() {
        print_empty_list("No attributes");
    }
    for pair in snapshot {
        let label = session
            .engine
            .registry()
            .tag_name_for_key(pair.key)
            .unwrap_or_else(|| format!("key {}", pair.key));
        print_key_value(&label, &pair.value);
    }
    print_section_footer();
}

#[derive(rustyline_derive::Hinter)]
struct MyHelper {
    commands_names: Vec<String>,
}

impl MyHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        MyHelper { commands_names }
    }
}

impl Completer for MyHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .cloned()
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for MyHelper {}
impl Validator for MyHelper {}
impl Helper for MyHelper {}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .try_init()?;

    info!("Opening metadata database {:?}", config.db_path);
    let session = Session::open(&config)?;

    if let Some(command) = cli_args.command {
        print_command_echo(&command);
        return match execute_command(command, &session) {
            CommandExecutionResult::Error(err) => Err(anyhow::anyhow!(err)),
            _ => Ok(()),
        };
    }

    print_welcome(
        &session.db_path.display().to_string(),
        session.engine.registry().len(),
    );

    let rl_config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<MyHelper, FileHistory>::with_config(rl_config)?;
    rl.set_helper(Some(MyHelper::new()));

    loop {
        match rl.readline(&get_prompt()) {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(line, &session) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => break,
                    CommandExecutionResult::Error(err) => {
                        print_error(&err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                debug!("Interrupted");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                print_error(&format!("{:?}", e));
                break;
            }
        }
    }
    print_goodbye();
    Ok(())
}
