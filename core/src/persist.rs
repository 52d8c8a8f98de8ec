use crate::index::{FieldIndex, Index};
use crate::{Document, Field};
use anyhow::{Context, Result};
use bincode;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub created_at: String,
    pub version: u32,
    pub workers: usize,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn fields_dir(&self) -> PathBuf { self.root.join("fields") }
    fn field(&self, field: Field) -> PathBuf { self.fields_dir().join(format!("{}.bin", field.as_str())) }
}

/// An index generation is present when its directory exists and is not empty.
pub fn index_exists(paths: &IndexPaths) -> bool {
    fs::read_dir(&paths.root).map(|mut entries| entries.next().is_some()).unwrap_or(false)
}

/// Deletes a previous generation so a rebuild starts from an empty directory.
pub fn clear_index(paths: &IndexPaths) -> Result<()> {
    if paths.root.exists() {
        fs::remove_dir_all(&paths.root).with_context(|| format!("removing old index {}", paths.root.display()))?;
    }
    Ok(())
}

fn write_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, value)?;
    w.flush()?;
    Ok(())
}

fn read_bin<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let value = bincode::deserialize_from(BufReader::new(f)).with_context(|| format!("decoding {}", path.display()))?;
    Ok(value)
}

pub fn save_docs(paths: &IndexPaths, docs: &[Document]) -> Result<()> {
    create_dir_all(&paths.root)?;
    write_bin(&paths.docs(), &docs)
}

pub fn load_docs(paths: &IndexPaths) -> Result<Vec<Document>> {
    read_bin(&paths.docs())
}

pub fn save_field(paths: &IndexPaths, field: Field, index: &FieldIndex) -> Result<()> {
    create_dir_all(paths.fields_dir())?;
    write_bin(&paths.field(field), index)
}

pub fn load_field(paths: &IndexPaths, field: Field) -> Result<FieldIndex> {
    read_bin(&paths.field(field))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta()).with_context(|| format!("opening {}", paths.meta().display()))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Writes a finished index. Meta goes last, so a directory without `meta.json` is incomplete.
pub fn save_index(paths: &IndexPaths, index: &Index, workers: usize) -> Result<()> {
    save_docs(paths, index.documents())?;
    for field in Field::ALL {
        save_field(paths, field, index.field(field))?;
    }
    let meta = MetaFile {
        num_docs: index.num_docs(),
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: FORMAT_VERSION,
        workers,
    };
    save_meta(paths, &meta)?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, "index saved");
    Ok(())
}

pub fn load_index(paths: &IndexPaths) -> Result<Index> {
    let meta = load_meta(paths)?;
    anyhow::ensure!(meta.version == FORMAT_VERSION, "index format version {} is not supported", meta.version);
    let docs = load_docs(paths)?;
    anyhow::ensure!(docs.len() as u32 == meta.num_docs, "meta.json lists {} docs, docs.bin has {}", meta.num_docs, docs.len());
    let fields = [load_field(paths, Field::Text)?, load_field(paths, Field::Summary)?, load_field(paths, Field::Cat)?];
    let index = Index::from_parts(docs, fields)?;
    tracing::info!(root = %paths.root.display(), num_docs = index.num_docs(), created_at = %meta.created_at, "index loaded");
    Ok(index)
}
