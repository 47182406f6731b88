use anyhow::{bail, Context, Result};
use blob::{Blob, Mode, MAX_LEAF_CAPACITY};
use config::Config;
use node::{NodeKind, NodeStore, Ref};
use tracing::info;

/// What the REPL loop should do after a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Print(String),
    Exit,
    Nothing,
}

/// Command interpreter over a node store holding a table of blobs.
///
/// The store's top node is a `Refs` node. Entry `i` is the root of blob `i`,
/// or null once the blob was dropped. Ids are never reused.
pub struct Shell<const CAP: usize = MAX_LEAF_CAPACITY> {
    store: NodeStore,
    top: Ref,
    config: Config,
}

impl<const CAP: usize> Shell<CAP> {
    /// Loads the snapshot at `config.store_path`, or starts empty if there is
    /// none.
    pub fn open(config: Config) -> Result<Self> {
        let (mut store, top) = if config.store_path.exists() {
            let (store, top) = NodeStore::open(&config.store_path)
                .with_context(|| format!("opening {}", config.store_path.display()))?;
            let header = store.header(top).context("reading blob table")?;
            if header.kind != NodeKind::Refs {
                bail!(
                    "{}: top node {} is not a blob table",
                    config.store_path.display(),
                    top
                );
            }
            (store, top)
        } else {
            let mut store = NodeStore::new();
            let top = store.alloc(NodeKind::Refs, false)?;
            (store, top)
        };
        store.set_limit(config.limit_bytes);

        info!(
            path = %config.store_path.display(),
            nodes = store.node_count(),
            "opened blob store"
        );
        Ok(Self { store, top, config })
    }

    /// One-line startup summary.
    pub fn summary(&self) -> String {
        let limit = match self.config.limit_bytes {
            Some(bytes) => format!("{}KiB", bytes / 1024),
            None => "none".to_string(),
        };
        format!(
            "path={}, blobs={}, nodes={}, limit={}, sync={}",
            self.config.store_path.display(),
            self.live_ids().map(|ids| ids.len()).unwrap_or(0),
            self.store.node_count(),
            limit,
            self.config.sync
        )
    }

    /// Executes one input line.
    pub fn execute(&mut self, line: &str) -> Action {
        let mut parts = line.split_whitespace();
        let cmd = match parts.next() {
            Some(cmd) => cmd.to_uppercase(),
            None => return Action::Nothing,
        };
        let args: Vec<&str> = parts.collect();

        let result = match cmd.as_str() {
            "NEW" => self.new_blob(&args),
            "APPEND" => self.append(&args),
            "INSERT" => self.insert(&args),
            "REPLACE" => self.replace(&args),
            "ERASE" => self.erase(&args),
            "READ" => self.read(&args),
            "SEGMENTS" => self.segments(&args),
            "SIZE" => self.size(&args),
            "VERIFY" => self.verify(&args),
            "DROP" => self.drop_blob(&args),
            "LIST" => self.list(),
            "COMMIT" => self.commit(),
            "STATS" => Ok(self.stats()),
            "EXIT" | "QUIT" => return Action::Exit,
            other => Ok(format!("unknown command: {}", other)),
        };

        match result {
            Ok(out) => Action::Print(out),
            Err(e) => Action::Print(format!("ERR {:#}", e)),
        }
    }

    // -------------------- commands --------------------

    fn new_blob(&mut self, args: &[&str]) -> Result<String> {
        let text = args.join(" ");
        let blob = Blob::<CAP>::create_from(&mut self.store, text.as_bytes())
            .context("create failed")?;
        let appended = self.writable_top().and_then(|top| {
            self.store.append_child_ref(top, blob.root())?;
            Ok(())
        });
        if let Err(e) = appended {
            let _ = blob.destroy(&mut self.store);
            return Err(e.context("create failed"));
        }
        let id = self.store.child_count(self.top)? - 1;
        Ok(id.to_string())
    }

    fn append(&mut self, args: &[&str]) -> Result<String> {
        let (id, rest) = split_id(args, "usage: APPEND id text")?;
        let text = rest.join(" ");
        if text.is_empty() {
            bail!("usage: APPEND id text");
        }
        self.mutate(id, "append failed", |blob, store| {
            blob.append(store, text.as_bytes(), false)
        })
    }

    fn insert(&mut self, args: &[&str]) -> Result<String> {
        const USAGE: &str = "usage: INSERT id pos text";
        let (id, rest) = split_id(args, USAGE)?;
        let (pos, rest) = split_number(rest, USAGE)?;
        let text = rest.join(" ");
        self.mutate(id, "insert failed", |blob, store| {
            blob.insert(store, pos, text.as_bytes(), false)
        })
    }

    fn replace(&mut self, args: &[&str]) -> Result<String> {
        const USAGE: &str = "usage: REPLACE id begin end text";
        let (id, rest) = split_id(args, USAGE)?;
        let (begin, rest) = split_number(rest, USAGE)?;
        let (end, rest) = split_number(rest, USAGE)?;
        let text = rest.join(" ");
        self.mutate(id, "replace failed", |blob, store| {
            blob.replace(store, begin, end, text.as_bytes(), false)
        })
    }

    fn erase(&mut self, args: &[&str]) -> Result<String> {
        const USAGE: &str = "usage: ERASE id begin end";
        let (id, rest) = split_id(args, USAGE)?;
        let (begin, rest) = split_number(rest, USAGE)?;
        let (end, _) = split_number(rest, USAGE)?;
        self.mutate(id, "erase failed", |blob, store| blob.erase(store, begin, end))
    }

    fn read(&self, args: &[&str]) -> Result<String> {
        let (id, _) = split_id(args, "usage: READ id")?;
        let blob = self.blob(id)?;
        let bytes = blob.to_vec(&self.store).context("read failed")?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn segments(&self, args: &[&str]) -> Result<String> {
        let (id, _) = split_id(args, "usage: SEGMENTS id")?;
        let blob = self.blob(id)?;

        let mut lines = Vec::new();
        let mut offset = 0;
        for segment in blob.segments(&self.store) {
            let segment = segment.context("read failed")?;
            lines.push(format!("{} +{}", offset, segment.len()));
            offset += segment.len();
        }
        lines.push(format!("({} segments)", lines.len()));
        Ok(lines.join("\n"))
    }

    fn size(&self, args: &[&str]) -> Result<String> {
        let (id, _) = split_id(args, "usage: SIZE id")?;
        self.describe(self.blob(id)?)
    }

    fn verify(&self, args: &[&str]) -> Result<String> {
        let ids = match args.first() {
            Some(_) => vec![split_id(args, "usage: VERIFY [id]")?.0],
            None => self.live_ids()?,
        };
        for &id in &ids {
            self.blob(id)?
                .verify(&self.store)
                .with_context(|| format!("blob {} failed verification", id))?;
        }
        Ok(format!("OK ({} verified)", ids.len()))
    }

    fn drop_blob(&mut self, args: &[&str]) -> Result<String> {
        let (id, _) = split_id(args, "usage: DROP id")?;
        let blob = self.blob(id)?;
        let top = self.writable_top()?;
        self.store.set_child_ref(top, id, Ref::NULL)?;
        blob.destroy(&mut self.store).context("drop failed")?;
        Ok("OK".to_string())
    }

    fn list(&self) -> Result<String> {
        let ids = self.live_ids()?;
        if ids.is_empty() {
            return Ok("(empty)".to_string());
        }
        let mut lines = Vec::with_capacity(ids.len() + 1);
        for &id in &ids {
            lines.push(format!("{}: {}", id, self.describe(self.blob(id)?)?));
        }
        lines.push(format!("({} blobs)", ids.len()));
        Ok(lines.join("\n"))
    }

    fn commit(&mut self) -> Result<String> {
        let path = self.config.store_path.clone();
        self.store
            .save(&path, self.top, self.config.sync)
            .with_context(|| format!("commit to {} failed", path.display()))?;
        info!(path = %path.display(), nodes = self.store.node_count(), "committed");
        Ok(format!("OK (nodes={})", self.store.node_count()))
    }

    fn stats(&self) -> String {
        let limit = self
            .store
            .limit()
            .map_or_else(|| "none".to_string(), |l| l.to_string());
        format!(
            "nodes={} used={} limit={} blobs={} top={}",
            self.store.node_count(),
            self.store.used_bytes(),
            limit,
            self.live_ids().map(|ids| ids.len()).unwrap_or(0),
            self.top
        )
    }

    // -------------------- helpers --------------------

    fn blob(&self, id: usize) -> Result<Blob<CAP>> {
        let count = self.store.child_count(self.top)?;
        if id >= count {
            bail!("no blob {}", id);
        }
        let root = self.store.child_ref(self.top, id)?;
        if root.is_null() {
            bail!("blob {} was dropped", id);
        }
        Ok(Blob::from_ref(root))
    }

    fn live_ids(&self) -> Result<Vec<usize>> {
        let mut ids = Vec::new();
        for id in 0..self.store.child_count(self.top)? {
            if !self.store.child_ref(self.top, id)?.is_null() {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn describe(&self, blob: Blob<CAP>) -> Result<String> {
        let size = blob.logical_size(&self.store)?;
        let mode = match blob.mode(&self.store)? {
            Mode::Flat => "flat",
            Mode::Chunked => "chunked",
        };
        Ok(format!("{} bytes, {}", size, mode))
    }

    /// Top table ready for writing. Copies it once after each commit.
    fn writable_top(&mut self) -> Result<Ref> {
        self.top = self.store.duplicate_for_write(self.top)?;
        Ok(self.top)
    }

    /// Runs a blob mutation and stores the resulting root in the table, also
    /// when the mutation failed after relocating the root.
    ///
    /// The table is made writable first, so a store too full to copy it
    /// fails before the blob is touched.
    fn mutate<F>(&mut self, id: usize, what: &'static str, op: F) -> Result<String>
    where
        F: FnOnce(&mut Blob<CAP>, &mut NodeStore) -> Result<Ref, blob::BlobError>,
    {
        let mut blob = self.blob(id)?;
        let top = self.writable_top().context(what)?;
        let old_root = blob.root();
        let result = op(&mut blob, &mut self.store);
        if blob.root() != old_root {
            self.store.set_child_ref(top, id, blob.root())?;
        }
        result.context(what)?;
        self.describe(blob).map(|d| format!("OK ({})", d))
    }
}

fn split_id<'a, 'b>(args: &'a [&'b str], usage: &'static str) -> Result<(usize, &'a [&'b str])> {
    let (first, rest) = args.split_first().context(usage)?;
    let id = first
        .parse()
        .with_context(|| format!("invalid id: {}", first))?;
    Ok((id, rest))
}

fn split_number<'a, 'b>(args: &'a [&'b str], usage: &'static str) -> Result<(usize, &'a [&'b str])> {
    let (first, rest) = args.split_first().context(usage)?;
    let n = first
        .parse()
        .with_context(|| format!("invalid number: {}", first))?;
    Ok((n, rest))
}
