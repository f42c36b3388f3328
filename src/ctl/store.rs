//! Line-oriented CTL task store
//!
//! Items live as compact JSON lines in four files under the store
//! directory (`.ctl/` by default). Each item is routed by kind:
//! completed tasks to `completed.jsonl`, metrics to `metrics.jsonl`,
//! agents and components to `architecture.jsonl`, everything else to
//! `tasks.jsonl`.

use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::model::{format_number, number_from_f64, Component, Kind};

pub const MAX_ID: usize = 32;
pub const MAX_TITLE: usize = 40;

/// Errors from the task store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("ID must be <= 32 characters")]
    IdTooLong,

    #[error("Title must be <= 40 characters")]
    TitleTooLong,

    #[error("Priority must be between 1 and 5")]
    InvalidPriority,

    #[error("Item with ID '{0}' already exists")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid item: {0}")]
    Invalid(String),

    #[error("Store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One of the store's files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Tasks,
    Completed,
    Metrics,
    Architecture,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::Tasks,
        Bucket::Completed,
        Bucket::Metrics,
        Bucket::Architecture,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Bucket::Tasks => "tasks.jsonl",
            Bucket::Completed => "completed.jsonl",
            Bucket::Metrics => "metrics.jsonl",
            Bucket::Architecture => "architecture.jsonl",
        }
    }

    /// Where an item of this shape belongs
    pub fn for_item(item: &Component) -> Self {
        match item.k {
            Kind::T if item.extra.contains_key("x_completed") => Bucket::Completed,
            Kind::M => Bucket::Metrics,
            Kind::A | Kind::C => Bucket::Architecture,
            _ => Bucket::Tasks,
        }
    }
}

/// Filters for `query`; unset fields match everything
#[derive(Debug, Default, Clone)]
pub struct Query {
    pub kind: Option<Kind>,
    pub priority: Option<u8>,
    pub depends_on: Option<String>,
    /// Match items carrying any of these flags
    pub flags: Vec<String>,
}

impl Query {
    pub fn kind(kind: Kind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    fn matches(&self, item: &Component) -> bool {
        self.kind.map_or(true, |k| item.k == k)
            && self.priority.map_or(true, |p| item.p == Some(p))
            && self.depends_on.as_deref().map_or(true, |d| item.depends_on(d))
            && (self.flags.is_empty() || self.flags.iter().any(|f| item.has_flag(f)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Text,
    Markdown,
}

/// A store rooted at one directory
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Open (and create) the store directory and its files
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let store = Self { dir };
        for bucket in Bucket::ALL {
            let path = store.path(bucket);
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(io_err(&path))?;
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, bucket: Bucket) -> PathBuf {
        self.dir.join(bucket.file_name())
    }

    /// Validate a raw item and append it to its bucket
    pub fn add(&self, item: Value) -> Result<Component, StoreError> {
        check_item(&item)?;
        let mut component: Component =
            serde_json::from_value(item).map_err(|e| StoreError::Invalid(e.to_string()))?;
        component.extra.retain(|key, _| key.starts_with("x_"));
        self.insert(&component)?;
        Ok(component)
    }

    fn insert(&self, component: &Component) -> Result<Bucket, StoreError> {
        if self.exists(&component.id)? {
            return Err(StoreError::Duplicate(component.id.clone()));
        }
        self.append(component)
    }

    fn append(&self, component: &Component) -> Result<Bucket, StoreError> {
        let bucket = Bucket::for_item(component);
        let path = self.path(bucket);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err(&path))?;
        writeln!(file, "{}", component.to_compact_json()).map_err(io_err(&path))?;

        tracing::debug!(id = %component.id, file = bucket.file_name(), "item stored");
        Ok(bucket)
    }

    /// Items of one bucket; unparsable lines are skipped
    pub fn read(&self, bucket: Bucket) -> Result<Vec<Component>, StoreError> {
        let path = self.path(bucket);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&path)(e)),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::debug!(file = bucket.file_name(), error = %e, "skipping line");
                    None
                }
            })
            .collect())
    }

    fn all(&self) -> Result<Vec<Component>, StoreError> {
        let mut items = Vec::new();
        for bucket in Bucket::ALL {
            items.extend(self.read(bucket)?);
        }
        Ok(items)
    }

    pub fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.all()?.iter().any(|item| item.id == id))
    }

    pub fn query(&self, query: &Query) -> Result<Vec<Component>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|item| query.matches(item))
            .collect())
    }

    /// Move a task to the completed file, stamping `x_completed`
    pub fn complete(&self, id: &str) -> Result<Component, StoreError> {
        let mut task = self
            .read(Bucket::Tasks)?
            .into_iter()
            .find(|item| item.k == Kind::T && item.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        task.set_extra("x_completed", now_iso());
        if task.r.is_none() {
            task.r = Some("completed".to_string());
        }

        // The task itself is still in tasks.jsonl; any other copy is a clash
        let copies = self.all()?.iter().filter(|item| item.id == id).count();
        if copies > 1 {
            return Err(StoreError::Duplicate(id.to_string()));
        }

        self.append(&task)?;
        self.remove(Bucket::Tasks, id)?;
        Ok(task)
    }

    /// Set a metric's current value and stamp `x_updated`
    ///
    /// Only the matching line is rewritten; every other line is kept as is.
    pub fn update_metric(&self, id: &str, current: f64) -> Result<Component, StoreError> {
        let path = self.path(Bucket::Metrics);
        let content = fs::read_to_string(&path).map_err(io_err(&path))?;

        let mut updated = None;
        let mut out = String::with_capacity(content.len());
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            if updated.is_none() {
                if let Ok(mut metric) = serde_json::from_str::<Component>(line) {
                    if metric.k == Kind::M && metric.id == id {
                        let m = metric.m.as_mut().ok_or_else(|| {
                            StoreError::Invalid(format!("metric '{}' has no 'm' field", id))
                        })?;
                        m.cur = number_from_f64(current);
                        metric.set_extra("x_updated", now_iso());
                        out.push_str(&metric.to_compact_json());
                        out.push('\n');
                        updated = Some(metric);
                        continue;
                    }
                }
            }
            out.push_str(line);
            out.push('\n');
        }

        let updated = updated.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        fs::write(&path, out).map_err(io_err(&path))?;
        Ok(updated)
    }

    /// Open high-priority tasks (p >= 4), highest first
    pub fn today(&self) -> Result<Vec<Component>, StoreError> {
        let mut tasks: Vec<Component> = self
            .active_tasks()?
            .into_iter()
            .filter(|t| t.p.unwrap_or(0) >= 4)
            .collect();
        sort_by_priority(&mut tasks);
        Ok(tasks)
    }

    pub fn report(&self, format: ReportFormat) -> Result<String, StoreError> {
        let mut tasks = self.active_tasks()?;
        sort_by_priority(&mut tasks);
        let completed = self
            .all()?
            .into_iter()
            .filter(|item| item.extra.contains_key("x_completed"))
            .count();

        let mut out = Vec::new();
        match format {
            ReportFormat::Text => {
                out.push(format!(
                    "Tasks: {} active, {} completed",
                    tasks.len(),
                    completed
                ));
                if !tasks.is_empty() {
                    out.push("\nActive tasks:".to_string());
                    for t in &tasks {
                        let p = t.p.map(|p| p.to_string()).unwrap_or_default();
                        out.push(format!("  [{}] {}: {}", p, t.id, t.t));
                    }
                }
            }
            ReportFormat::Markdown => {
                out.push("# CTL Status Report\n".to_string());
                out.push(format!(
                    "*Generated: {}*\n",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                ));
                out.push("## Tasks\n".to_string());
                out.push(format!("- Active: {}", tasks.len()));
                out.push(format!("- Completed: {}", completed));

                if !tasks.is_empty() {
                    out.push("\n### Active Tasks\n".to_string());
                    for t in &tasks {
                        out.push(format!(
                            "- {} **{}** (`{}`)",
                            priority_marks(t.p),
                            t.t,
                            t.id
                        ));
                    }
                }

                let metrics = self.query(&Query::kind(Kind::M))?;
                let with_values: Vec<_> = metrics
                    .iter()
                    .filter_map(|item| item.m.as_ref().map(|m| (item, m)))
                    .collect();
                if !with_values.is_empty() {
                    out.push("\n## Metrics\n".to_string());
                    for (item, m) in with_values {
                        out.push(format!(
                            "- **{}**: {}{} / {}{} ({:.0}%)",
                            item.t,
                            format_number(&m.cur),
                            m.u,
                            format_number(&m.tgt),
                            m.u,
                            m.progress()
                        ));
                    }
                }
            }
        }
        Ok(out.join("\n"))
    }

    /// Mermaid dependency graph over tasks, features, bugs, epics,
    /// components and agents
    pub fn graph(&self) -> Result<String, StoreError> {
        let mut items = Vec::new();
        for kind in [Kind::T, Kind::F, Kind::B, Kind::E, Kind::C, Kind::A] {
            items.extend(self.query(&Query::kind(kind))?);
        }

        let mut lines = vec![
            "```mermaid".to_string(),
            "graph TD".to_string(),
            "    classDef task fill:#e3f2fd,stroke:#1976d2,stroke-width:2px".to_string(),
            "    classDef bug fill:#ffebee,stroke:#d32f2f,stroke-width:2px".to_string(),
            "    classDef feature fill:#f3e5f5,stroke:#7b1fa2,stroke-width:2px".to_string(),
            "    classDef component fill:#e8f5e9,stroke:#388e3c,stroke-width:2px".to_string(),
            "    classDef epic fill:#fff3e0,stroke:#f57c00,stroke-width:2px".to_string(),
        ];

        for item in &items {
            let label = match item.p {
                Some(p) => format!("{} {}", "★".repeat(p as usize), item.t),
                None => item.t.clone(),
            };
            let class = match item.k {
                Kind::T => ":::task",
                Kind::B => ":::bug",
                Kind::F => ":::feature",
                Kind::C => ":::component",
                Kind::E => ":::epic",
                _ => "",
            };
            lines.push(format!("    {}[{}]{}", node_id(&item.id), label, class));
        }

        for item in &items {
            for dep in item.d.iter().flatten() {
                lines.push(format!("    {} --> {}", node_id(dep.id()), node_id(&item.id)));
            }
        }

        lines.push("```".to_string());
        Ok(lines.join("\n"))
    }

    fn active_tasks(&self) -> Result<Vec<Component>, StoreError> {
        let mut tasks = self.query(&Query::kind(Kind::T))?;
        tasks.retain(|t| !t.extra.contains_key("x_completed"));
        Ok(tasks)
    }

    fn remove(&self, bucket: Bucket, id: &str) -> Result<(), StoreError> {
        let path = self.path(bucket);
        let content = fs::read_to_string(&path).map_err(io_err(&path))?;
        let kept: String = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter(|line| {
                serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|v| v.get("id").and_then(Value::as_str).map(|s| s != id))
                    .unwrap_or(true)
            })
            .map(|line| format!("{}\n", line))
            .collect();
        fs::write(&path, kept).map_err(io_err(&path))
    }
}

/// Required fields and size limits for a new item
fn check_item(item: &Value) -> Result<(), StoreError> {
    let obj = item
        .as_object()
        .ok_or_else(|| StoreError::Invalid("item must be a JSON object".to_string()))?;

    for field in ["k", "id", "t"] {
        if !obj.contains_key(field) {
            return Err(StoreError::MissingField(field));
        }
    }
    if str_len(obj, "id") > MAX_ID {
        return Err(StoreError::IdTooLong);
    }
    if str_len(obj, "t") > MAX_TITLE {
        return Err(StoreError::TitleTooLong);
    }
    if let Some(p) = obj.get("p") {
        if !p.as_i64().is_some_and(|p| (1..=5).contains(&p)) {
            return Err(StoreError::InvalidPriority);
        }
    }
    Ok(())
}

fn str_len(obj: &Map<String, Value>, key: &str) -> usize {
    obj.get(key)
        .and_then(Value::as_str)
        .map_or(0, |s| s.chars().count())
}

fn sort_by_priority(items: &mut [Component]) {
    items.sort_by(|a, b| b.p.unwrap_or(0).cmp(&a.p.unwrap_or(0)));
}

fn node_id(id: &str) -> String {
    id.replace('-', "_")
}

fn now_iso() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Priority shown as red circles (`p` of them)
pub fn priority_marks(p: Option<u8>) -> String {
    "🔴".repeat(p.unwrap_or(0) as usize)
}

/// Parse a command-line item: JSON, or `key=value` tokens
///
/// In token form `k` is uppercased, `p` is an integer and `d`/`f` are
/// comma-separated lists.
pub fn parse_item(arg: &str) -> Result<Value, StoreError> {
    if let Ok(value) = serde_json::from_str::<Value>(arg) {
        return Ok(value);
    }

    let mut item = Map::new();
    for token in arg.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let parsed = match key {
            "k" => Value::from(value.to_uppercase()),
            "p" => Value::from(
                value
                    .parse::<i64>()
                    .map_err(|_| StoreError::Invalid(format!("priority '{}' is not a number", value)))?,
            ),
            "d" | "f" => Value::from(value.split(',').collect::<Vec<_>>()),
            _ => Value::from(value),
        };
        item.insert(key.to_string(), parsed);
    }
    Ok(Value::Object(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join(".ctl")).unwrap();
        (dir, store)
    }

    fn lines(store: &Store, bucket: Bucket) -> Vec<String> {
        fs::read_to_string(store.path(bucket))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_open_creates_files() {
        let (_dir, store) = store();
        for bucket in Bucket::ALL {
            assert!(store.path(bucket).is_file());
        }
    }

    #[test]
    fn test_add_routes_and_orders_keys() {
        let (_dir, store) = store();
        store
            .add(json!({"f": ["x"], "t": "Fix login", "id": "fix-login", "k": "T", "p": 4, "junk": 1, "x_owner": "me"}))
            .unwrap();
        store
            .add(json!({"k": "M", "id": "latency", "t": "p99", "m": {"cur": 120, "tgt": 100, "u": "ms"}}))
            .unwrap();
        store.add(json!({"k": "C", "id": "core", "t": "Core"})).unwrap();

        assert_eq!(
            lines(&store, Bucket::Tasks),
            vec![r#"{"k":"T","id":"fix-login","t":"Fix login","p":4,"f":["x"],"x_owner":"me"}"#]
        );
        assert_eq!(lines(&store, Bucket::Metrics).len(), 1);
        assert_eq!(lines(&store, Bucket::Architecture).len(), 1);
    }

    #[test]
    fn test_add_rejects() {
        let (_dir, store) = store();
        assert!(matches!(
            store.add(json!({"k": "T", "t": "x"})),
            Err(StoreError::MissingField("id"))
        ));
        assert!(matches!(
            store.add(json!({"k": "T", "id": "a".repeat(33), "t": "x"})),
            Err(StoreError::IdTooLong)
        ));
        assert!(matches!(
            store.add(json!({"k": "T", "id": "a", "t": "x".repeat(41)})),
            Err(StoreError::TitleTooLong)
        ));
        assert!(matches!(
            store.add(json!({"k": "T", "id": "a", "t": "x", "p": 6})),
            Err(StoreError::InvalidPriority)
        ));
        store.add(json!({"k": "T", "id": "a", "t": "x"})).unwrap();
        assert!(matches!(
            store.add(json!({"k": "C", "id": "a", "t": "y"})),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn test_query_filters() {
        let (_dir, store) = store();
        store
            .add(json!({"k": "T", "id": "a", "t": "A", "p": 5, "d": ["b"], "f": ["ui"]}))
            .unwrap();
        store.add(json!({"k": "T", "id": "b", "t": "B", "p": 2})).unwrap();
        store.add(json!({"k": "F", "id": "c", "t": "C", "f": ["api"]})).unwrap();
        fs::write(
            store.path(Bucket::Tasks),
            format!("{}\nnot json\n", fs::read_to_string(store.path(Bucket::Tasks)).unwrap().trim_end()),
        )
        .unwrap();

        let ids = |q: Query| -> Vec<String> {
            store.query(&q).unwrap().into_iter().map(|c| c.id).collect()
        };
        assert_eq!(ids(Query::kind(Kind::T)), vec!["a", "b"]);
        assert_eq!(
            ids(Query {
                priority: Some(5),
                ..Query::default()
            }),
            vec!["a"]
        );
        assert_eq!(
            ids(Query {
                depends_on: Some("b".into()),
                ..Query::default()
            }),
            vec!["a"]
        );
        assert_eq!(
            ids(Query {
                flags: vec!["api".into(), "nope".into()],
                ..Query::default()
            }),
            vec!["c"]
        );
    }

    #[test]
    fn test_complete_moves_task() {
        let (_dir, store) = store();
        store.add(json!({"k": "T", "id": "a", "t": "A", "p": 4})).unwrap();

        let done = store.complete("a").unwrap();
        assert_eq!(done.r.as_deref(), Some("completed"));
        assert!(lines(&store, Bucket::Tasks).is_empty());
        let completed = lines(&store, Bucket::Completed);
        assert_eq!(completed.len(), 1);
        assert!(completed[0].contains("\"x_completed\""));

        assert!(store.today().unwrap().is_empty());
        assert!(matches!(store.complete("a"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_update_metric() {
        let (_dir, store) = store();
        store
            .add(json!({"k": "M", "id": "latency", "t": "p99", "m": {"cur": 120, "tgt": 100, "u": "ms"}}))
            .unwrap();
        let updated = store.update_metric("latency", 95.0).unwrap();
        assert_eq!(updated.m.unwrap().current(), 95.0);
        let line = &lines(&store, Bucket::Metrics)[0];
        assert!(line.contains(r#""cur":95"#));
        assert!(line.contains("x_updated"));
        assert!(matches!(
            store.update_metric("nope", 1.0),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_complete_keeps_task_on_clash() {
        let (_dir, store) = store();
        store.add(json!({"k": "T", "id": "a", "t": "A"})).unwrap();
        fs::write(
            store.path(Bucket::Architecture),
            "{\"k\":\"C\",\"id\":\"a\",\"t\":\"Hand edited\"}\n",
        )
        .unwrap();

        assert!(matches!(store.complete("a"), Err(StoreError::Duplicate(_))));
        assert_eq!(lines(&store, Bucket::Tasks).len(), 1);
        assert!(lines(&store, Bucket::Completed).is_empty());
    }

    #[test]
    fn test_update_metric_keeps_other_lines() {
        let (_dir, store) = store();
        let legacy = r#"{"k":"M","id":"legacy","t":"old metric","m":{"cur":1,"tgt":5}}"#;
        let note = "not json at all";
        fs::write(store.path(Bucket::Metrics), format!("{}\n{}\n", legacy, note)).unwrap();
        store
            .add(json!({"k": "M", "id": "lat", "t": "Latency", "m": {"cur": 10, "tgt": 2}}))
            .unwrap();

        store.update_metric("lat", 3.0).unwrap();

        let metrics = lines(&store, Bucket::Metrics);
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[0], legacy);
        assert_eq!(metrics[1], note);
        assert!(metrics[2].contains(r#""cur":3"#));
    }

    #[test]
    fn test_today_and_report() {
        let (_dir, store) = store();
        store.add(json!({"k": "T", "id": "low", "t": "Low", "p": 1})).unwrap();
        store.add(json!({"k": "T", "id": "high", "t": "High", "p": 4})).unwrap();
        store.add(json!({"k": "T", "id": "top", "t": "Top", "p": 5})).unwrap();
        store
            .add(json!({"k": "M", "id": "cov", "t": "Coverage", "m": {"cur": 45, "tgt": 90, "u": "%"}}))
            .unwrap();

        let today: Vec<String> = store.today().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(today, vec!["top", "high"]);

        let text = store.report(ReportFormat::Text).unwrap();
        assert_eq!(
            text,
            "Tasks: 3 active, 0 completed\n\nActive tasks:\n  [5] top: Top\n  [4] high: High\n  [1] low: Low"
        );

        let md = store.report(ReportFormat::Markdown).unwrap();
        assert!(md.starts_with("# CTL Status Report\n"));
        assert!(md.contains("- 🔴🔴🔴🔴🔴 **Top** (`top`)"));
        assert!(md.contains("- **Coverage**: 45% / 90% (50%)"));
    }

    #[test]
    fn test_graph() {
        let (_dir, store) = store();
        store.add(json!({"k": "C", "id": "core-lib", "t": "Core"})).unwrap();
        store
            .add(json!({"k": "T", "id": "wire", "t": "Wire up", "p": 2, "d": ["core-lib"]}))
            .unwrap();

        let graph = store.graph().unwrap();
        assert!(graph.starts_with("```mermaid\ngraph TD\n"));
        assert!(graph.contains("    wire[★★ Wire up]:::task"));
        assert!(graph.contains("    core_lib[Core]:::component"));
        assert!(graph.contains("    core_lib --> wire"));
        assert!(graph.ends_with("```"));
    }

    #[test]
    fn test_parse_item() {
        assert_eq!(
            parse_item(r#"{"k":"T","id":"a","t":"A"}"#).unwrap(),
            json!({"k": "T", "id": "a", "t": "A"})
        );
        assert_eq!(
            parse_item("k=t id=fix t=Fix p=3 d=a,b f=ui").unwrap(),
            json!({"k": "T", "id": "fix", "t": "Fix", "p": 3, "d": ["a", "b"], "f": ["ui"]})
        );
        assert!(parse_item("k=T p=high").is_err());
    }
}
