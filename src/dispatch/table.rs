use super::handlers::{HealthCheck, Help, ModeHandler, SupervisedCommand, Version};
use crate::config::Dependency;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_APP_COMMAND: &str = "gunicorn --bind 0.0.0.0:8000 --workers 4 --access-logfile - wsgi:app";
pub const DEFAULT_WORKER_COMMAND: &str = "celery -A app.celery worker --loglevel=info";
pub const DEFAULT_BEAT_COMMAND: &str = "celery -A app.celery beat --loglevel=info";
pub const DEFAULT_FLOWER_COMMAND: &str = "celery -A app.celery flower --port=5555";
pub const DEFAULT_SHELL_COMMAND: &str = "flask shell";
pub const DEFAULT_MIGRATE_COMMAND: &str = "flask db upgrade";
pub const DEFAULT_SEED_COMMAND: &str = "flask seed";
pub const DEFAULT_TEST_COMMAND: &str = "pytest";
pub const DEFAULT_BACKUP_COMMAND: &str = "pg_dump --format=custom --file=/backups/latest.dump";
pub const DEFAULT_RESTORE_COMMAND: &str = "pg_restore --clean --if-exists /backups/latest.dump";

/// How a mode's process relates to the container's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    /// Runs until stopped; its exit ends the container.
    LongRunning,
    /// Runs to completion and reports its exit code.
    OneShot,
    /// Owns the terminal; Ctrl+C belongs to the child.
    Interactive,
    /// Handled in-process without spawning anything.
    Utility,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeKind::LongRunning => write!(f, "long-running"),
            ModeKind::OneShot => write!(f, "one-shot"),
            ModeKind::Interactive => write!(f, "interactive"),
            ModeKind::Utility => write!(f, "utility"),
        }
    }
}

/// One row of the mode table.
#[derive(Clone)]
pub struct CommandModeEntry {
    pub name: String,
    pub aliases: Vec<String>,
    pub summary: String,
    pub kind: ModeKind,
    pub dependencies: Vec<Dependency>,
    pub handler: Arc<dyn ModeHandler>,
}

impl fmt::Debug for CommandModeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandModeEntry")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("kind", &self.kind)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl CommandModeEntry {
    pub fn new(name: impl Into<String>, kind: ModeKind, handler: Arc<dyn ModeHandler>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            summary: String::new(),
            kind,
            dependencies: Vec::new(),
            handler,
        }
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = Dependency>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    fn answers_to(&self, normalized: &str) -> bool {
        self.name == normalized || self.aliases.iter().any(|a| a == normalized)
    }
}

/// Static mode table with alias lookup.
#[derive(Debug, Clone, Default)]
pub struct ModeTable {
    entries: Vec<CommandModeEntry>,
}

impl ModeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The modes entrygate ships with.
    pub fn builtin() -> Self {
        use Dependency::*;
        use ModeKind::*;

        let supervised = |line: &str| -> Arc<dyn ModeHandler> { Arc::new(SupervisedCommand::new(line)) };
        let interactive = |line: &str| -> Arc<dyn ModeHandler> {
            Arc::new(SupervisedCommand::new(line).interactive())
        };

        let mut table = Self::new();
        table
            .insert(
                CommandModeEntry::new("app", LongRunning, supervised(DEFAULT_APP_COMMAND))
                    .aliases(["server", "webapp", "web"])
                    .depends_on([Database, Cache])
                    .summary("Start the web application server"),
            )
            .insert(
                CommandModeEntry::new("worker", LongRunning, supervised(DEFAULT_WORKER_COMMAND))
                    .aliases(["celery", "celery-worker"])
                    .depends_on([Database, Broker])
                    .summary("Start a background task worker"),
            )
            .insert(
                CommandModeEntry::new("beat", LongRunning, supervised(DEFAULT_BEAT_COMMAND))
                    .aliases(["scheduler", "celery-beat"])
                    .depends_on([Database, Broker])
                    .summary("Start the periodic task scheduler"),
            )
            .insert(
                CommandModeEntry::new("flower", LongRunning, supervised(DEFAULT_FLOWER_COMMAND))
                    .aliases(["monitor"])
                    .depends_on([Broker])
                    .summary("Start the task monitoring dashboard"),
            )
            .insert(
                CommandModeEntry::new("shell", Interactive, interactive(DEFAULT_SHELL_COMMAND))
                    .aliases(["console"])
                    .depends_on([Database])
                    .summary("Open an interactive application shell"),
            )
            .insert(
                CommandModeEntry::new("migrate", OneShot, supervised(DEFAULT_MIGRATE_COMMAND))
                    .aliases(["migrations", "upgrade"])
                    .depends_on([Database])
                    .summary("Apply database migrations"),
            )
            .insert(
                CommandModeEntry::new("seed", OneShot, supervised(DEFAULT_SEED_COMMAND))
                    .depends_on([Database])
                    .summary("Load seed data"),
            )
            .insert(
                CommandModeEntry::new("test", OneShot, supervised(DEFAULT_TEST_COMMAND))
                    .aliases(["tests", "pytest"])
                    .depends_on([Database, Cache])
                    .summary("Run the test suite"),
            )
            .insert(
                CommandModeEntry::new("backup", OneShot, supervised(DEFAULT_BACKUP_COMMAND))
                    .depends_on([Database])
                    .summary("Dump the database"),
            )
            .insert(
                CommandModeEntry::new("restore", OneShot, supervised(DEFAULT_RESTORE_COMMAND))
                    .depends_on([Database])
                    .summary("Restore the database from the latest dump"),
            )
            .insert(
                CommandModeEntry::new("health", Utility, Arc::new(HealthCheck))
                    .aliases(["healthcheck", "check"])
                    .summary("Probe every configured dependency once (--json for JSON)"),
            )
            .insert(
                CommandModeEntry::new("help", Utility, Arc::new(Help))
                    .aliases(["-h", "--help"])
                    .summary("Show this help"),
            )
            .insert(
                CommandModeEntry::new("version", Utility, Arc::new(Version))
                    .aliases(["-V", "--version"])
                    .summary("Print the version"),
            );
        table
    }

    /// Add an entry, replacing any entry with the same name.
    pub fn insert(&mut self, entry: CommandModeEntry) -> &mut Self {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// Find the entry for a mode name or alias, ignoring case and
    /// surrounding whitespace.
    pub fn resolve(&self, mode: &str) -> Option<&CommandModeEntry> {
        let normalized = mode.trim().to_lowercase();
        self.entries.iter().find(|e| e.answers_to(&normalized))
    }

    pub fn entries(&self) -> &[CommandModeEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}
