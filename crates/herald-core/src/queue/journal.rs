//! Append-only JSON-lines journal of task snapshots.
//!
//! Every state change appends the full task. Replay keeps the last snapshot
//! per id, in order of first appearance, which is enqueue order. Opening a
//! journal rewrites it compacted; the queue also compacts it at runtime once
//! superseded snapshots pile up.
//!
//! File I/O is synchronous and runs under the queue lock. On a multi-thread
//! runtime it goes through `block_in_place` so the worker thread's other
//! tasks are handed off first.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::runtime::{Handle, RuntimeFlavor};

use crate::domain::{Task, TaskId};
use crate::ports::QueueError;

pub(crate) struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Lines in the file, superseded snapshots included.
    lines: usize,
}

impl Journal {
    /// Latest snapshot of every task in the journal at `path`, in enqueue
    /// order. A missing file is an empty journal.
    ///
    /// A torn final line (crash mid-append) is dropped; corruption anywhere
    /// else is an error.
    pub fn replay(path: &Path) -> Result<Vec<Task>, QueueError> {
        blocking(|| Self::read_snapshots(path))
    }

    fn read_snapshots(path: &Path) -> Result<Vec<Task>, QueueError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // Raw bytes: a torn tail may end inside a multi-byte character.
        let lines: Vec<Vec<u8>> = BufReader::new(file).split(b'\n').collect::<Result<_, _>>()?;
        let last_line = lines.iter().rposition(|l| !is_blank(l));

        let mut order: Vec<TaskId> = Vec::new();
        let mut latest: HashMap<TaskId, Task> = HashMap::new();
        for (idx, line) in lines.iter().enumerate() {
            if is_blank(line) {
                continue;
            }
            let task: Task = match serde_json::from_slice(line) {
                Ok(task) => task,
                Err(source) if Some(idx) == last_line => {
                    tracing::warn!(
                        path = %path.display(),
                        line = idx + 1,
                        error = %source,
                        "Dropping torn journal tail"
                    );
                    break;
                }
                Err(source) => {
                    return Err(QueueError::Corrupt {
                        line: idx + 1,
                        source,
                    });
                }
            };
            if latest.insert(task.id, task.clone()).is_none() {
                order.push(task.id);
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|id| latest.remove(&id))
            .collect())
    }

    /// Replace the journal at `path` with exactly `tasks` and open it for
    /// appending.
    pub fn create_compacted(path: &Path, tasks: &[Task]) -> Result<Self, QueueError> {
        blocking(|| Self::write_compacted(path, tasks))
    }

    fn write_compacted(path: &Path, tasks: &[Task]) -> Result<Self, QueueError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }

        let tmp = path.with_extension("compacting");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for task in tasks {
                write_line(&mut out, task)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            lines: tasks.len(),
        })
    }

    /// Durably record the current state of `task`.
    pub fn append(&mut self, task: &Task) -> Result<(), QueueError> {
        blocking(|| {
            write_line(&mut self.writer, task)?;
            self.writer.flush()?;
            self.writer.get_ref().sync_data()?;
            Ok::<_, QueueError>(())
        })?;
        self.lines += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> usize {
        self.lines
    }
}

/// Run blocking file I/O without stalling the runtime's other tasks.
/// `block_in_place` is unavailable on the current-thread runtime, where the
/// closure simply runs inline.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn write_line(out: &mut impl Write, task: &Task) -> Result<(), QueueError> {
    let line = serde_json::to_string(task).map_err(std::io::Error::other)?;
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SmsPayload, TaskStatus};
    use chrono::Utc;
    use ulid::Ulid;

    fn task(body: &str) -> Task {
        Task::new(
            TaskId::from_ulid(Ulid::new()),
            SmsPayload::new("+15550000", body).into(),
            Utc::now(),
        )
    }

    #[test]
    fn missing_file_replays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = Journal::replay(&dir.path().join("queue.jsonl")).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn replay_keeps_last_snapshot_in_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");

        let a = task("a");
        let b = task("b");
        let mut journal = Journal::create_compacted(&path, &[]).unwrap();
        journal.append(&a).unwrap();
        journal.append(&b).unwrap();

        let mut a_done = a.clone();
        a_done.start_attempt(Utc::now());
        a_done.mark_succeeded(Utc::now());
        journal.append(&a_done).unwrap();
        drop(journal);

        let tasks = Journal::replay(&path).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, a.id);
        assert_eq!(tasks[0].status, TaskStatus::Succeeded);
        assert_eq!(tasks[1].id, b.id);
        assert_eq!(tasks[1].status, TaskStatus::Pending);
    }

    #[test]
    fn compaction_rewrites_one_line_per_task() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.jsonl");

        let a = task("a");
        let mut journal = Journal::create_compacted(&path, &[]).unwrap();
        journal.append(&a).unwrap();
        journal.append(&a).unwrap();
        drop(journal);

        let tasks = Journal::replay(&path).unwrap();
        let journal = Journal::create_compacted(&path, &tasks).unwrap();
        assert_eq!(journal.path(), path.as_path());
        assert_eq!(journal.lines(), 1);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn appends_from_a_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        let mut journal = Journal::create_compacted(&path, &[]).unwrap();
        journal.append(&task("a")).unwrap();
        journal.append(&task("b")).unwrap();
        assert_eq!(journal.lines(), 2);
        drop(journal);

        assert_eq!(Journal::replay(&path).unwrap().len(), 2);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        let a = task("a");
        let mut journal = Journal::create_compacted(&path, &[]).unwrap();
        journal.append(&a).unwrap();
        drop(journal);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\":\"01H").unwrap();
        drop(file);

        let tasks = Journal::replay(&path).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, a.id);
    }

    #[test]
    fn tail_torn_inside_a_multibyte_character_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        let a = task("caf\u{e9}");
        let mut journal = Journal::create_compacted(&path, &[]).unwrap();
        journal.append(&a).unwrap();
        drop(journal);

        // "é" is 0xC3 0xA9; the crash left only the first byte.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\":\"01H\",\"body\":\"h\xC3").unwrap();
        drop(file);

        let tasks = Journal::replay(&path).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, a.id);
    }

    #[test]
    fn invalid_utf8_in_the_middle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        let a = serde_json::to_string(&task("a")).unwrap();
        let mut bytes = b"{\"id\":\"\xC3\"}\n".to_vec();
        bytes.extend_from_slice(a.as_bytes());
        bytes.push(b'\n');
        fs::write(&path, bytes).unwrap();

        let err = Journal::replay(&path).unwrap_err();
        assert!(matches!(err, QueueError::Corrupt { line: 1, .. }));
    }

    #[test]
    fn corruption_in_the_middle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        let a = serde_json::to_string(&task("a")).unwrap();
        fs::write(&path, format!("not json\n{a}\n")).unwrap();

        let err = Journal::replay(&path).unwrap_err();
        assert!(matches!(err, QueueError::Corrupt { line: 1, .. }));
    }
}
