//! Session persistence: the whole database as one binary image.
//!
//! Layout: `{dir}/{name}.session` (postcard image) and `{dir}/{name}.meta.json`
//! (sidecar with shape, key list and a BLAKE3 digest of the image).
//!
//! Writes are atomic (write to .tmp, rename into place). Restore checks the
//! marker and the digest before building a new [`Edb`]; the caller replaces
//! its in-memory state only on success. Floats are stored bit-exact, so NaN
//! and ±inf cells survive the round trip.

use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{
    BlockStats, DataStore, DateIndex, DerivedMeta, Edb, Entity, EntityRegistry, TypeRegistry,
};
use crate::error::SessionError;

const SESSION_MARKER: &str = "FINFOOLS-SESSION-1";

/// Sidecar describing a saved session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub name: String,
    pub entities: usize,
    pub dates: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub keys: Vec<String>,
    pub image_hash: String,
    pub saved_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct MatrixRecord {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl MatrixRecord {
    fn from_array(m: &Array2<f64>) -> Self {
        Self {
            rows: m.nrows(),
            cols: m.ncols(),
            data: m.iter().copied().collect(),
        }
    }

    fn into_array(self) -> Result<Array2<f64>, SessionError> {
        Array2::from_shape_vec((self.rows, self.cols), self.data)
            .map_err(|e| SessionError::Corrupt(format!("matrix shape: {e}")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BlockRecord {
    window: usize,
    first_col: usize,
    avgs: MatrixRecord,
    stds: MatrixRecord,
    qntl_dim: (usize, usize, usize),
    qntls: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetaRecord {
    tag: String,
    src: String,
    base: String,
    start_col: usize,
    end_col: usize,
    data: MatrixRecord,
    labels: Vec<String>,
    blocks: Option<BlockRecord>,
}

impl MetaRecord {
    fn from_meta(meta: &DerivedMeta) -> Self {
        Self {
            tag: meta.tag.clone(),
            src: meta.src.clone(),
            base: meta.base.clone(),
            start_col: meta.start_col,
            end_col: meta.end_col,
            data: MatrixRecord::from_array(&meta.data),
            labels: meta.labels.clone(),
            blocks: meta.blocks.as_ref().map(|b| BlockRecord {
                window: b.window,
                first_col: b.first_col,
                avgs: MatrixRecord::from_array(&b.avgs),
                stds: MatrixRecord::from_array(&b.stds),
                qntl_dim: b.qntls.dim(),
                qntls: b.qntls.iter().copied().collect(),
            }),
        }
    }

    fn into_meta(self) -> Result<DerivedMeta, SessionError> {
        let blocks = match self.blocks {
            Some(b) => Some(BlockStats {
                window: b.window,
                first_col: b.first_col,
                avgs: b.avgs.into_array()?,
                stds: b.stds.into_array()?,
                qntls: Array3::from_shape_vec(b.qntl_dim, b.qntls)
                    .map_err(|e| SessionError::Corrupt(format!("quantile shape: {e}")))?,
            }),
            None => None,
        };
        Ok(DerivedMeta {
            tag: self.tag,
            src: self.src,
            base: self.base,
            start_col: self.start_col,
            end_col: self.end_col,
            data: self.data.into_array()?,
            labels: self.labels,
            blocks,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionImage {
    marker: String,
    capacity: (usize, usize),
    dates: Vec<NaiveDate>,
    entities: Vec<Entity>,
    types: Vec<(String, BTreeSet<String>)>,
    base: Vec<(String, MatrixRecord)>,
    derived: Vec<(String, MatrixRecord, MetaRecord)>,
    aliases: BTreeMap<String, String>,
}

/// Encode the database as a session image.
pub fn to_bytes(edb: &Edb) -> Result<Vec<u8>, SessionError> {
    let store = edb.store();
    let types = edb
        .types()
        .names()
        .iter()
        .enumerate()
        .map(|(id, name)| {
            let members = edb.types().members(id).cloned().unwrap_or_default();
            (name.clone(), members)
        })
        .collect();
    let base = store
        .base_keys()
        .iter()
        .filter_map(|k| store.get(k).map(|m| (k.clone(), MatrixRecord::from_array(m))))
        .collect();
    let derived = store
        .derived_keys()
        .filter_map(|k| {
            let m = store.get(k)?;
            let meta = store.meta(k)?;
            Some((
                k.to_string(),
                MatrixRecord::from_array(m),
                MetaRecord::from_meta(meta),
            ))
        })
        .collect();

    let image = SessionImage {
        marker: SESSION_MARKER.to_string(),
        capacity: edb.capacity(),
        dates: edb.dates().dates().to_vec(),
        entities: edb.entities().to_vec(),
        types,
        base,
        derived,
        aliases: store.aliases().clone(),
    };
    Ok(postcard::to_stdvec(&image)?)
}

/// Decode a session image into a fresh database.
pub fn from_bytes(bytes: &[u8]) -> Result<Edb, SessionError> {
    let image: SessionImage = postcard::from_bytes(bytes)?;
    if image.marker != SESSION_MARKER {
        return Err(SessionError::Corrupt(format!(
            "unexpected marker '{}'",
            image.marker
        )));
    }

    let base = image
        .base
        .into_iter()
        .map(|(k, m)| Ok((k, m.into_array()?)))
        .collect::<Result<Vec<_>, SessionError>>()?;
    let derived = image
        .derived
        .into_iter()
        .map(|(k, m, meta)| Ok((k, m.into_array()?, meta.into_meta()?)))
        .collect::<Result<Vec<_>, SessionError>>()?;

    Ok(Edb::from_parts(
        DateIndex::from_dates(image.dates),
        EntityRegistry::from_entities(image.entities),
        TypeRegistry::from_parts(image.types),
        DataStore::from_parts(base, derived, image.aliases),
        image.capacity,
    ))
}

fn image_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.session"))
}

fn meta_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.meta.json"))
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SessionError + '_ {
    move |source| SessionError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SessionError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes).map_err(io_err(&tmp_path))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_err(path)(e)
    })
}

/// Save `edb` under `name` in `dir`. Returns the image path.
pub fn save_session(edb: &Edb, dir: &Path, name: &str) -> Result<PathBuf, SessionError> {
    fs::create_dir_all(dir).map_err(io_err(dir))?;
    let bytes = to_bytes(edb)?;
    let path = image_path(dir, name);
    write_atomic(&path, &bytes)?;

    let meta = SessionMeta {
        name: name.to_string(),
        entities: edb.shape().0,
        dates: edb.shape().1,
        first_date: edb.dates().date_of(0),
        last_date: edb.last_date(),
        keys: edb.store().keys(),
        image_hash: blake3::hash(&bytes).to_hex().to_string(),
        saved_at: chrono::Local::now().naive_local(),
    };
    let meta_json = serde_json::to_vec_pretty(&meta)?;
    write_atomic(&meta_path(dir, name), &meta_json)?;

    info!(session = name, bytes = bytes.len(), "session saved");
    Ok(path)
}

/// Read the sidecar of a saved session.
pub fn read_session_meta(dir: &Path, name: &str) -> Result<SessionMeta, SessionError> {
    let path = meta_path(dir, name);
    if !path.exists() {
        return Err(SessionError::NotFound(name.to_string()));
    }
    let content = fs::read(&path).map_err(io_err(&path))?;
    Ok(serde_json::from_slice(&content)?)
}

/// Restore the session `name` from `dir`, verifying its digest.
pub fn restore_session(dir: &Path, name: &str) -> Result<Edb, SessionError> {
    let path = image_path(dir, name);
    if !path.exists() {
        return Err(SessionError::NotFound(name.to_string()));
    }
    let meta = read_session_meta(dir, name)?;
    let bytes = fs::read(&path).map_err(io_err(&path))?;
    let digest = blake3::hash(&bytes).to_hex().to_string();
    if digest != meta.image_hash {
        return Err(SessionError::Corrupt(format!(
            "digest mismatch for session '{name}'"
        )));
    }
    let edb = from_bytes(&bytes)?;
    info!(session = name, entities = meta.entities, dates = meta.dates, "session restored");
    Ok(edb)
}
