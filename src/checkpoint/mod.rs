// src/checkpoint/mod.rs

//! Persisted output of streamed runs.
//!
//! A streamed run owns the folder `<root>/<save_name>/`. Snapshots go to set
//! files `<save_name>_s<k>.jsonl`, each holding at most `max_writes` of them,
//! and once stepping completes the run record is written to `params.json`.
//! A later process loads that record and reconciles it against the folder
//! before anything is played back.
//!
//! Set files are JSON Lines: a [`SetHeader`] line followed by one
//! [`SnapshotRecord`] per write. Writes only ever append, and playback seeks
//! straight to the line of the requested frame.

use crate::config::ExperimentConfig;
use crate::kernel::Grid;
use crate::meshing::PolarMesh;
use crate::provenance::{calculate_hash, ProvenanceChain};
use crate::spectral::GatheredField;
use crate::{EngineError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the run record inside an output folder.
pub const PARAMS_FILE: &str = "params.json";

/// Folder name used when a streamed run does not name its output.
pub fn default_save_name(family: &str) -> String {
    format!(
        "Snapshots {} {}",
        Local::now().format("%Y-%m-%d %H-%M-%S"),
        family
    )
}

/// One saved step of the observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Position in save order across all sets.
    pub index: usize,
    pub iteration: u64,
    pub sim_time: f64,
    /// Azimuth-major rows.
    pub values: Vec<Vec<f64>>,
}

impl SnapshotRecord {
    pub fn to_grid(&self) -> Result<Grid> {
        let rows = self.values.len();
        let cols = self.values.first().map_or(0, Vec::len);
        let flat: Vec<f64> = self.values.iter().flatten().copied().collect();
        Grid::from_shape_vec((rows, cols), flat).map_err(|e| {
            EngineError::Resumption(format!("snapshot {} is not rectangular: {}", self.index, e))
        })
    }
}

/// First line of a set file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetHeader {
    pub task: String,
    pub phi: Vec<f64>,
    pub r: Vec<f64>,
}

/// Contents of one set file.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSet {
    pub header: SetHeader,
    pub writes: Vec<SnapshotRecord>,
}

impl SnapshotSet {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let (header, lines) = split_set(&bytes, path)?;
        let writes = lines
            .into_iter()
            .map(|line| serde_json::from_slice(&bytes[line]))
            .collect::<std::result::Result<Vec<SnapshotRecord>, _>>()?;
        Ok(SnapshotSet { header, writes })
    }
}

/// Parses the header line and returns the byte ranges of the record lines.
fn split_set(bytes: &[u8], path: &Path) -> Result<(SetHeader, Vec<Range<usize>>)> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, byte) in bytes.iter().enumerate() {
        if *byte == b'\n' {
            if i > start {
                lines.push(start..i);
            }
            start = i + 1;
        }
    }
    if start < bytes.len() {
        lines.push(start..bytes.len());
    }
    if lines.is_empty() {
        return Err(EngineError::Resumption(format!(
            "snapshot set {} is empty",
            path.display()
        )));
    }
    let header = serde_json::from_slice(&bytes[lines.remove(0)])?;
    Ok((header, lines))
}

/// Listing of one set file in the run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    pub file: String,
    pub writes: usize,
    pub sha256: String,
}

/// The run record of a streamed run, `params.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub save_name: String,
    pub config: ExperimentConfig,
    pub variable: String,
    /// Mesh of the saved snapshots, at the output scale.
    pub mesh: PolarMesh,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    /// Set once stepping completed and every set was flushed. From then on
    /// the folder contents are the authoritative output.
    pub resumable: bool,
    pub iterations: u64,
    pub final_sim_time: f64,
    pub sets: Vec<SetEntry>,
    pub provenance: ProvenanceChain,
}

impl RunState {
    pub fn folder(root: &Path, save_name: &str) -> PathBuf {
        root.join(save_name)
    }

    pub fn total_writes(&self) -> usize {
        self.sets.iter().map(|s| s.writes).sum()
    }

    /// Writes the record into `<root>/<save_name>/params.json`.
    pub fn save(&self, root: &Path) -> Result<PathBuf> {
        let folder = Self::folder(root, &self.save_name);
        fs::create_dir_all(&folder)?;
        let path = folder.join(PARAMS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&path, json.as_bytes())?;
        debug!(path = %path.display(), "run record saved");
        Ok(path)
    }

    pub fn load(root: &Path, save_name: &str) -> Result<Self> {
        let path = Self::folder(root, save_name).join(PARAMS_FILE);
        if !path.is_file() {
            return Err(EngineError::Resumption(format!(
                "no run record at {}",
                path.display()
            )));
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Validates the output folder against this record: every listed set must
    /// exist, match its checksum and write count, and hold snapshots shaped
    /// like the recorded mesh.
    pub fn reconcile(&self, root: &Path) -> Result<ReconciledRun> {
        if !self.resumable {
            return Err(EngineError::Resumption(format!(
                "run '{}' did not complete",
                self.save_name
            )));
        }
        let folder = Self::folder(root, &self.save_name);
        if !folder.is_dir() {
            return Err(EngineError::Resumption(format!(
                "output folder {} is missing",
                folder.display()
            )));
        }
        self.provenance.verify()?;

        let shape = self.mesh.shape();
        let mut frames = Vec::with_capacity(self.total_writes());
        for (set_index, entry) in self.sets.iter().enumerate() {
            let path = folder.join(&entry.file);
            let bytes = fs::read(&path).map_err(|e| {
                EngineError::Resumption(format!("snapshot set {} unreadable: {}", path.display(), e))
            })?;
            if calculate_hash(&bytes) != entry.sha256 {
                return Err(EngineError::Resumption(format!(
                    "checksum mismatch for {}",
                    entry.file
                )));
            }
            let (header, lines) = split_set(&bytes, &path)?;
            if lines.len() != entry.writes {
                return Err(EngineError::Resumption(format!(
                    "{} holds {} writes, record lists {}",
                    entry.file,
                    lines.len(),
                    entry.writes
                )));
            }
            if header.task != self.variable || (header.phi.len(), header.r.len()) != shape {
                return Err(EngineError::Resumption(format!(
                    "{} does not hold '{}' on a {:?} mesh",
                    entry.file, self.variable, shape
                )));
            }
            for line in lines {
                let record: SnapshotRecord = serde_json::from_slice(&bytes[line.clone()])?;
                if record.to_grid()?.dim() != shape {
                    return Err(EngineError::Resumption(format!(
                        "snapshot {} in {} has the wrong shape",
                        record.index, entry.file
                    )));
                }
                frames.push(FrameLocation {
                    set: set_index,
                    offset: line.start as u64,
                    len: line.len(),
                    sim_time: record.sim_time,
                });
            }
        }

        Ok(ReconciledRun {
            folder,
            files: self.sets.iter().map(|s| s.file.clone()).collect(),
            variable: self.variable.clone(),
            mesh: self.mesh.clone(),
            frames,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameLocation {
    set: usize,
    /// Byte span of the record line within its set file.
    offset: u64,
    len: usize,
    sim_time: f64,
}

/// A validated output folder. Snapshot values stay on disk until read.
#[derive(Debug, Clone)]
pub struct ReconciledRun {
    pub folder: PathBuf,
    files: Vec<String>,
    pub variable: String,
    pub mesh: PolarMesh,
    frames: Vec<FrameLocation>,
}

impl ReconciledRun {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.frames.iter().map(|f| f.sim_time).collect()
    }

    /// Reads snapshot `k` in save order.
    pub fn read_frame(&self, k: usize) -> Result<(f64, Grid)> {
        let location = self.frames.get(k).ok_or_else(|| {
            EngineError::Resumption(format!("frame {} out of range ({} frames)", k, self.len()))
        })?;
        let path = self.folder.join(&self.files[location.set]);
        let mut file = fs::File::open(&path)?;
        file.seek(SeekFrom::Start(location.offset))?;
        let mut line = vec![0; location.len];
        file.read_exact(&mut line).map_err(|e| {
            EngineError::Resumption(format!("frame {} unreadable from {}: {}", k, path.display(), e))
        })?;
        let record: SnapshotRecord = serde_json::from_slice(&line)?;
        Ok((record.sim_time, record.to_grid()?))
    }
}

/// Streams snapshots of one task into set files.
#[derive(Debug)]
pub struct SnapshotWriter {
    folder: PathBuf,
    save_name: String,
    task: String,
    max_writes: usize,
    mesh: Option<PolarMesh>,
    current: Option<OpenSet>,
    sets: Vec<SetEntry>,
    writes: usize,
}

impl SnapshotWriter {
    pub fn create(root: &Path, save_name: &str, task: &str, max_writes: usize) -> Result<Self> {
        let folder = RunState::folder(root, save_name);
        if folder.join(PARAMS_FILE).exists() {
            warn!(folder = %folder.display(), "output folder already holds a run record; it will be replaced");
        }
        fs::create_dir_all(&folder)?;
        Ok(SnapshotWriter {
            folder,
            save_name: save_name.to_string(),
            task: task.to_string(),
            max_writes: max_writes.max(1),
            mesh: None,
            current: None,
            sets: Vec::new(),
            writes: 0,
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Mesh of the written snapshots, known after the first write.
    pub fn mesh(&self) -> Option<&PolarMesh> {
        self.mesh.as_ref()
    }

    /// Appends a snapshot line to the open set file.
    pub fn write(&mut self, iteration: u64, sim_time: f64, field: &GatheredField) -> Result<()> {
        let mesh = self.mesh.get_or_insert_with(|| field.mesh.clone());
        if *mesh != field.mesh {
            return Err(EngineError::ShapeMismatch {
                expected: mesh.shape(),
                found: field.mesh.shape(),
            });
        }
        if self.current.is_none() {
            let file = format!("{}_s{}.jsonl", self.save_name, self.sets.len() + 1);
            let header = SetHeader {
                task: self.task.clone(),
                phi: field.mesh.phi.clone(),
                r: field.mesh.r.clone(),
            };
            let set = OpenSet::create(&self.folder.join(&file), &header)?;
            self.sets.push(SetEntry {
                file,
                writes: 0,
                sha256: set.checksum(),
            });
            self.current = Some(set);
        }

        let (set, entry) = match (self.current.as_mut(), self.sets.last_mut()) {
            (Some(set), Some(entry)) => (set, entry),
            _ => {
                return Err(EngineError::SolverFailed(
                    "snapshot writer lost its open set".to_string(),
                ))
            }
        };
        let record = SnapshotRecord {
            index: self.writes,
            iteration,
            sim_time,
            values: field.values.outer_iter().map(|row| row.to_vec()).collect(),
        };
        set.append(&serde_json::to_vec(&record)?)?;
        entry.writes += 1;
        entry.sha256 = set.checksum();
        debug!(file = %entry.file, write = self.writes, sim_time, "snapshot written");

        self.writes += 1;
        if entry.writes >= self.max_writes {
            self.current = None;
        }
        Ok(())
    }

    /// Closes the writer and returns the listing of every set written.
    pub fn finish(self) -> Vec<SetEntry> {
        self.sets
    }
}

/// A set file open for appending, with the running checksum of its bytes.
struct OpenSet {
    file: fs::File,
    hasher: Sha256,
}

impl OpenSet {
    fn create(path: &Path, header: &SetHeader) -> Result<Self> {
        let mut set = OpenSet {
            file: fs::File::create(path)?,
            hasher: Sha256::new(),
        };
        set.append(&serde_json::to_vec(header)?)?;
        Ok(set)
    }

    fn append(&mut self, line: &[u8]) -> Result<()> {
        self.file.write_all(line)?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        self.hasher.update(line);
        self.hasher.update(b"\n");
        Ok(())
    }

    fn checksum(&self) -> String {
        format!("{:x}", self.hasher.clone().finalize())
    }
}

impl fmt::Debug for OpenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSet").field("file", &self.file).finish_non_exhaustive()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
