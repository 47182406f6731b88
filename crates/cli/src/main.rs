///! # CLI - Blob Store Interactive Shell
///!
///! A REPL over a persistent node store holding a table of blobs. Reads
///! commands from stdin, prints results to stdout and logs to stderr.
///! Scripted use works by piping commands via stdin.
///!
///! ## Commands
///!
///! ```text
///! NEW [text]                 Create a blob, prints its id
///! APPEND id text             Append text (promotes to chunked when needed)
///! INSERT id pos text         Insert text at pos (flat blobs only)
///! REPLACE id begin end text  Replace bytes begin..end (flat blobs only)
///! ERASE id begin end         Remove bytes begin..end (flat blobs only)
///! READ id                    Print the blob's contents
///! SEGMENTS id                Print each physical segment as "offset +len"
///! SIZE id                    Print logical size and mode
///! VERIFY [id]                Structural check of one or every blob
///! DROP id                    Destroy a blob
///! LIST                       List live blobs
///! COMMIT                     Write the snapshot file
///! STATS                      Print node store statistics
///! EXIT / QUIT                Leave without committing
///! ```
///!
///! ## Configuration
///!
///! ```text
///! BLOBSTORE_PATH      snapshot file                        (default: "blobs.db")
///! BLOBSTORE_SYNC      fsync on COMMIT                      (default: "true")
///! BLOBSTORE_LIMIT_KB  node store budget in KiB, 0 = none   (default: 0)
///! BLOBSTORE_LOG       tracing filter directive             (default: "warn")
///! ```
///!
///! ## Example
///!
///! ```text
///! $ cargo run -p cli
///! blobstore started (path=blobs.db, blobs=0, nodes=1, limit=none, sync=true)
///! > NEW hello
///! 0
///! > APPEND 0 world
///! OK (10 bytes, flat)
///! > COMMIT
///! OK (nodes=2)
///! > EXIT
///! bye
///! ```

mod shell;

use anyhow::{Context, Result};
use config::{Config, LOG_VAR};
use shell::{Action, Shell};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config = Config::from_env()?;

    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid {}: {:?}", LOG_VAR, config.log_filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut shell: Shell = Shell::open(config)?;

    println!("blobstore started ({})", shell.summary());
    println!("Commands: NEW [text] | APPEND id text | INSERT id pos text | REPLACE id begin end text");
    println!("          ERASE id begin end | READ id | SEGMENTS id | SIZE id | VERIFY [id]");
    println!("          DROP id | LIST | COMMIT | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        match shell.execute(&line) {
            Action::Print(out) => println!("{}", out),
            Action::Exit => {
                println!("bye");
                break;
            }
            Action::Nothing => {}
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
