//! Worker identity and the collective primitives the tabulation protocol
//! needs: barrier, all-gather and elementwise all-reduce.
//!
//! None of the collectives time out. A worker that dies mid-run leaves the
//! others blocked until they are killed; the checkpoint logs make the next
//! run pick up where this one stopped.

use crate::domain::{HaloError, HaloResult};
use crate::table::codec::{push_array, take_array};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectiveError {
    #[error("worker group size must be positive, got {0}")]
    EmptyGroup(usize),
    #[error("rank {rank} is out of bounds for group size {size}")]
    RankOutOfBounds { rank: usize, size: usize },
    #[error("worker group state was poisoned by a panicking worker")]
    Poisoned,
    #[error("rendezvous I/O failed on '{path}': {message}")]
    Io { path: String, message: String },
    #[error("rendezvous file '{path}' is malformed")]
    Malformed { path: String },
    #[error("rendezvous directory '{path}' holds stale files for rank {rank}")]
    StaleRendezvous { path: String, rank: usize },
}

impl From<CollectiveError> for HaloError {
    fn from(error: CollectiveError) -> Self {
        match error {
            CollectiveError::EmptyGroup(_)
            | CollectiveError::RankOutOfBounds { .. }
            | CollectiveError::StaleRendezvous { .. } => {
                HaloError::configuration("CONFIG.WORKERS", error.to_string())
            }
            CollectiveError::Io { .. } => HaloError::io_system("IO.RENDEZVOUS", error.to_string()),
            CollectiveError::Malformed { .. } => {
                HaloError::format("FORMAT.RENDEZVOUS", error.to_string())
            }
            CollectiveError::Poisoned => HaloError::internal("RUN.COLLECTIVE", error.to_string()),
        }
    }
}

/// Rank and size of this worker within its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerContext {
    rank: usize,
    size: usize,
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self { rank: 0, size: 1 }
    }
}

impl WorkerContext {
    pub fn new(rank: usize, size: usize) -> Result<Self, CollectiveError> {
        if size == 0 {
            return Err(CollectiveError::EmptyGroup(size));
        }
        if rank >= size {
            return Err(CollectiveError::RankOutOfBounds { rank, size });
        }
        Ok(Self { rank, size })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The leader is the only worker that writes final artifacts.
    pub fn is_leader(&self) -> bool {
        self.rank == 0
    }

    /// Static round-robin ownership of work item `index`.
    pub fn owns(&self, index: usize) -> bool {
        index % self.size == self.rank
    }
}

/// Blocking collectives over a fixed worker group. Every worker must call
/// the same collectives in the same order.
pub trait Communicator {
    fn context(&self) -> WorkerContext;

    /// Every worker's `values`, indexed by rank. Contributions may differ
    /// in length.
    fn all_gather(&self, values: &[f64]) -> HaloResult<Vec<Vec<f64>>>;

    fn barrier(&self) -> HaloResult<()> {
        self.all_gather(&[]).map(|_| ())
    }

    /// Gathers every worker's values tagged with the contributing rank,
    /// flattened in rank order.
    fn all_gather_ranked(&self, values: &[f64]) -> HaloResult<Vec<(usize, f64)>> {
        Ok(self
            .all_gather(values)?
            .into_iter()
            .enumerate()
            .flat_map(|(rank, contribution)| contribution.into_iter().map(move |value| (rank, value)))
            .collect())
    }

    /// Elementwise sum over workers, accumulated in rank order so every
    /// worker ends with bit-identical values.
    fn all_reduce_sum(&self, values: &mut [f64]) -> HaloResult<()> {
        let gathered = self.all_gather(values)?;
        if let Some(contribution) = gathered.iter().find(|contribution| contribution.len() != values.len()) {
            return Err(HaloError::internal(
                "RUN.COLLECTIVE",
                format!(
                    "all-reduce length mismatch: expected {}, got {}",
                    values.len(),
                    contribution.len()
                ),
            ));
        }

        for (index, value) in values.iter_mut().enumerate() {
            *value = gathered
                .iter()
                .fold(0.0, |total, contribution| total + contribution[index]);
        }
        Ok(())
    }
}

/// The single-worker group.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloCommunicator;

impl Communicator for SoloCommunicator {
    fn context(&self) -> WorkerContext {
        WorkerContext::default()
    }

    fn all_gather(&self, values: &[f64]) -> HaloResult<Vec<Vec<f64>>> {
        Ok(vec![values.to_vec()])
    }
}

#[derive(Debug)]
struct GroupState {
    inner: Mutex<GroupInner>,
    condvar: Condvar,
}

#[derive(Debug, Default)]
struct GroupInner {
    generation: u64,
    arrived: usize,
    slots: Vec<Vec<f64>>,
    published: Arc<Vec<Vec<f64>>>,
}

/// Workers sharing one process, typically one per thread. Used to run the
/// distributed protocol in tests without launching processes.
pub struct InProcessGroup;

impl InProcessGroup {
    /// One communicator per rank, in rank order.
    pub fn new(size: usize) -> Result<Vec<InProcessCommunicator>, CollectiveError> {
        if size == 0 {
            return Err(CollectiveError::EmptyGroup(size));
        }
        let state = Arc::new(GroupState {
            inner: Mutex::new(GroupInner {
                slots: vec![Vec::new(); size],
                ..GroupInner::default()
            }),
            condvar: Condvar::new(),
        });

        (0..size)
            .map(|rank| {
                Ok(InProcessCommunicator {
                    context: WorkerContext::new(rank, size)?,
                    state: Arc::clone(&state),
                })
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct InProcessCommunicator {
    context: WorkerContext,
    state: Arc<GroupState>,
}

impl Communicator for InProcessCommunicator {
    fn context(&self) -> WorkerContext {
        self.context
    }

    fn all_gather(&self, values: &[f64]) -> HaloResult<Vec<Vec<f64>>> {
        let mut inner = self
            .state
            .inner
            .lock()
            .map_err(|_| CollectiveError::Poisoned)?;

        let generation = inner.generation;
        inner.slots[self.context.rank] = values.to_vec();
        inner.arrived += 1;

        if inner.arrived == self.context.size {
            let slots = std::mem::replace(&mut inner.slots, vec![Vec::new(); self.context.size]);
            inner.published = Arc::new(slots);
            inner.arrived = 0;
            inner.generation = inner.generation.wrapping_add(1);
            self.state.condvar.notify_all();
            return Ok(inner.published.as_ref().clone());
        }

        while inner.generation == generation {
            inner = self
                .state
                .condvar
                .wait(inner)
                .map_err(|_| CollectiveError::Poisoned)?;
        }
        // A faster worker cannot publish the next generation before this
        // one has joined it, so `published` still belongs to ours.
        Ok(inner.published.as_ref().clone())
    }
}

/// Separate OS processes meeting in a shared directory.
///
/// Collective `n` of rank `r` is the file `collective-{n:06}.rank-{r:03}`,
/// written to a temporary name and renamed into place. A worker removes its
/// own file of collective `n - 1` once collective `n` has completed, since
/// every peer must have read it by then.
#[derive(Debug)]
pub struct FileCommunicator {
    context: WorkerContext,
    directory: PathBuf,
    sequence: Cell<u64>,
}

impl FileCommunicator {
    /// The directory must not hold files left by an earlier run for this rank.
    pub fn new(directory: impl Into<PathBuf>, context: WorkerContext) -> Result<Self, CollectiveError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| io_error(&directory, source))?;

        let own_suffix = format!(".rank-{:03}", context.rank);
        let entries = fs::read_dir(&directory).map_err(|source| io_error(&directory, source))?;
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&directory, source))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("collective-") && name.ends_with(&own_suffix) {
                return Err(CollectiveError::StaleRendezvous {
                    path: directory.display().to_string(),
                    rank: context.rank,
                });
            }
        }

        Ok(Self {
            context,
            directory,
            sequence: Cell::new(0),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn slot_path(&self, sequence: u64, rank: usize) -> PathBuf {
        self.directory
            .join(format!("collective-{:06}.rank-{:03}", sequence, rank))
    }

    fn publish(&self, sequence: u64, values: &[f64]) -> Result<(), CollectiveError> {
        let mut bytes = Vec::with_capacity(12 + values.len() * 8);
        push_array(&mut bytes, &[values.len()], values);

        let target = self.slot_path(sequence, self.context.rank);
        let staging = target.with_extension(format!("rank-{:03}.tmp", self.context.rank));
        fs::write(&staging, bytes).map_err(|source| io_error(&staging, source))?;
        fs::rename(&staging, &target).map_err(|source| io_error(&target, source))
    }

    fn collect(&self, sequence: u64, rank: usize) -> Result<Vec<f64>, CollectiveError> {
        let path = self.slot_path(sequence, rank);
        loop {
            match fs::read(&path) {
                Ok(bytes) => {
                    let mut offset = 0;
                    return match take_array(&bytes, &mut offset) {
                        Some((_, values)) if offset == bytes.len() => Ok(values),
                        _ => Err(CollectiveError::Malformed {
                            path: path.display().to_string(),
                        }),
                    };
                }
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(source) => return Err(io_error(&path, source)),
            }
        }
    }
}

impl Communicator for FileCommunicator {
    fn context(&self) -> WorkerContext {
        self.context
    }

    fn all_gather(&self, values: &[f64]) -> HaloResult<Vec<Vec<f64>>> {
        let sequence = self.sequence.get() + 1;
        self.sequence.set(sequence);

        self.publish(sequence, values)?;
        let gathered = (0..self.context.size)
            .map(|rank| self.collect(sequence, rank))
            .collect::<Result<Vec<_>, _>>()?;

        if sequence > 1 {
            let previous = self.slot_path(sequence - 1, self.context.rank);
            if let Err(source) = fs::remove_file(&previous) {
                tracing::debug!(path = %previous.display(), %source, "could not remove rendezvous file");
            }
        }
        Ok(gathered)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CollectiveError {
    CollectiveError::Io {
        path: path.display().to_string(),
        message: source.to_string(),
    }
}
