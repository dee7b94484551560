//! mountfs - poke at a mount layout from the shell.
//!
//! Usage:
//!   mountfs --config mounts.toml ls /
//!   mountfs write /notes.txt "hello"
//!   printf 'mkdir -p /a/b\nwrite /a/b/c hi\ncat /a/b/c\n' | mountfs batch
//!
//! Without `--config` a single memory backend is mounted at `/`, so state only
//! lives as long as one invocation. `batch` runs many commands against one
//! process.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mountfs::{FileSystem, Metadata, Vfs, VfsConfig};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "mountfs", about = "Composite filesystem shell")]
struct Args {
    /// Mount layout (TOML). Defaults to one memory backend at `/`.
    #[arg(short, long, env = "MOUNTFS_CONFIG")]
    config: Option<PathBuf>,

    /// Print `mounts`, `ls` and `stat` output as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List mount points
    Mounts,
    /// List a directory
    Ls { path: PathBuf },
    /// Show metadata for a path
    Stat { path: PathBuf },
    /// Print a file to stdout
    Cat { path: PathBuf },
    /// Replace a file's contents
    Write { path: PathBuf, text: String },
    /// Create a directory
    Mkdir {
        /// Create missing parents
        #[arg(short, long)]
        parents: bool,
        path: PathBuf,
    },
    /// Remove a file or empty directory
    Rm {
        /// Remove directories and their contents
        #[arg(short, long)]
        recursive: bool,
        path: PathBuf,
    },
    /// Rename within one backend
    Mv { from: PathBuf, to: PathBuf },
    /// Change permission bits (octal)
    Chmod {
        #[arg(value_parser = parse_mode)]
        mode: u32,
        path: PathBuf,
    },
    /// Read commands from stdin, one per line
    Batch,
}

/// One line of `batch` input.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct BatchLine {
    #[command(subcommand)]
    command: Command,
}

fn parse_mode(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| format!("invalid octal mode: {s}"))
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mountfs: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => VfsConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => VfsConfig::memory_root(),
    };
    let vfs = config.build().context("building mounts")?;
    tracing::debug!(mounts = vfs.mounts().len(), "vfs ready");

    let shell = Shell {
        vfs: &vfs,
        json: args.json,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.command {
        Command::Batch => {
            let failures = shell.batch(io::stdin().lock(), &mut out)?;
            if failures > 0 {
                bail!("{failures} command(s) failed");
            }
            Ok(())
        }
        command => shell.exec(command, &mut out),
    }
}

struct Shell<'a> {
    vfs: &'a Vfs,
    json: bool,
}

impl Shell<'_> {
    fn exec(&self, command: Command, out: &mut dyn Write) -> anyhow::Result<()> {
        let vfs = self.vfs;
        match command {
            Command::Mounts => {
                let mounts = vfs.mounts();
                if self.json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&mounts)?)?;
                } else {
                    for m in mounts {
                        writeln!(out, "{:<24} {:<12} open={}", m.prefix, m.backend, m.open_count)?;
                    }
                }
            }
            Command::Ls { path } => {
                let mut entries = vfs.read_dir(&path)?;
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                if self.json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
                } else {
                    for entry in &entries {
                        write_entry(out, entry)?;
                    }
                }
            }
            Command::Stat { path } => {
                let meta = vfs.stat(&path)?;
                if self.json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&meta)?)?;
                } else {
                    write_entry(out, &meta)?;
                }
            }
            Command::Cat { path } => {
                let data = vfs.read_all(&path)?;
                out.write_all(&data)?;
            }
            Command::Write { path, text } => {
                vfs.write_all(&path, text.as_bytes())?;
            }
            Command::Mkdir { parents, path } => {
                if parents {
                    vfs.mkdir_all(&path, 0o755)?;
                } else {
                    vfs.mkdir(&path, 0o755)?;
                }
            }
            Command::Rm { recursive, path } => {
                if recursive {
                    vfs.remove_all(&path)?;
                } else {
                    vfs.remove(&path)?;
                }
            }
            Command::Mv { from, to } => vfs.rename(&from, &to)?,
            Command::Chmod { mode, path } => vfs.chmod(&path, mode)?,
            Command::Batch => bail!("batch cannot be nested"),
        }
        Ok(())
    }

    /// Run every line of `input`, reporting failures on stderr. Returns the
    /// number of lines that failed.
    fn batch(&self, input: impl BufRead, out: &mut dyn Write) -> anyhow::Result<usize> {
        let mut failures = 0;
        for (lineno, line) in input.lines().enumerate() {
            let line = line.context("reading stdin")?;
            let words = split_words(&line);
            if words.is_empty() || words[0].starts_with('#') {
                continue;
            }
            let result = match BatchLine::try_parse_from(&words) {
                Ok(parsed) => self.exec(parsed.command, &mut *out),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                failures += 1;
                tracing::debug!(line = lineno + 1, "batch command failed");
                eprintln!("line {}: {e:#}", lineno + 1);
            }
        }
        Ok(failures)
    }
}

fn write_entry(out: &mut dyn Write, meta: &Metadata) -> io::Result<()> {
    writeln!(out, "{} {:>10} {}", meta.mode_string(), meta.size, meta.name)
}

/// Split on whitespace, keeping double-quoted runs together.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;
    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    words.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_output(vfs: &Vfs, script: &str) -> (String, usize) {
        let shell = Shell { vfs, json: false };
        let mut out = Vec::new();
        let failures = shell.batch(script.as_bytes(), &mut out).unwrap();
        (String::from_utf8(out).unwrap(), failures)
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("write /a \"two words\""), ["write", "/a", "two words"]);
        assert_eq!(split_words("  ls   / "), ["ls", "/"]);
        assert_eq!(split_words("write /a \"\""), ["write", "/a", ""]);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("644"), Ok(0o644));
        assert_eq!(parse_mode("0o755"), Ok(0o755));
        assert!(parse_mode("999").is_err());
        assert!(parse_mode("77777").is_err());
    }

    #[test]
    fn test_batch_persists_state() {
        let vfs = VfsConfig::memory_root().build().unwrap();
        let (out, failures) = shell_output(
            &vfs,
            "# setup\nmkdir -p /a/b\nwrite /a/b/c \"hi there\"\ncat /a/b/c\n",
        );
        assert_eq!(failures, 0);
        assert_eq!(out, "hi there");
    }

    #[test]
    fn test_batch_counts_failures() {
        let vfs = VfsConfig::memory_root().build().unwrap();
        let (_, failures) = shell_output(&vfs, "cat /missing\nbogus\nbatch\nmkdir /ok\n");
        assert_eq!(failures, 3);
        assert!(vfs.stat(std::path::Path::new("/ok")).unwrap().is_dir());
    }

    #[test]
    fn test_ls_and_chmod() {
        let vfs = VfsConfig::memory_root().build().unwrap();
        let (out, failures) = shell_output(&vfs, "write /f x\nchmod 600 /f\nls /\n");
        assert_eq!(failures, 0);
        assert_eq!(out.trim_end(), "-rw-------          1 f");
    }

    #[test]
    fn test_mounts_json() {
        let vfs = VfsConfig::memory_root().build().unwrap();
        let shell = Shell {
            vfs: &vfs,
            json: true,
        };
        let mut out = Vec::new();
        shell.exec(Command::Mounts, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["prefix"], "/");
        assert_eq!(value[0]["open_count"], 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let disk = dir.path().join("disk");
        std::fs::create_dir(&disk).unwrap();
        let config = dir.path().join("mounts.toml");
        std::fs::write(
            &config,
            format!(
                "[backends.scratch]\ntype = \"memory\"\n\n\
                 [backends.disk]\ntype = \"local\"\nroot = {:?}\n\n\
                 [[mounts]]\nprefix = \"/\"\nbackend = \"scratch\"\n\n\
                 [[mounts]]\nprefix = \"/disk\"\nbackend = \"disk\"\n",
                disk.display().to_string()
            ),
        )
        .unwrap();

        let args = Args::try_parse_from([
            "mountfs",
            "--config",
            config.to_str().unwrap(),
            "write",
            "/disk/hello.txt",
            "from the cli",
        ])
        .unwrap();
        run(args).unwrap();
        assert_eq!(
            std::fs::read_to_string(disk.join("hello.txt")).unwrap(),
            "from the cli"
        );
    }

    #[test]
    fn test_run_missing_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        let args = Args {
            config: Some(missing),
            json: false,
            command: Command::Mounts,
        };
        let err = run(args).unwrap_err();
        assert!(format!("{err:#}").contains("absent.toml"), "{err:#}");
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["mountfs", "mkdir", "-p", "/x/y"]).unwrap();
        assert!(matches!(args.command, Command::Mkdir { parents: true, .. }));
        assert!(args.config.is_none());
    }
}
