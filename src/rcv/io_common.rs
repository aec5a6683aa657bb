// Primitives shared by the readers: source file descriptors and archives.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use zip::ZipArchive;

use crate::rcv::*;

/// Provenance of one source file of an import.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct SourceFile {
    pub name: String,
    pub sha256: String,
}

/// Hashes the content of a source file, streaming it through the digest.
///
/// `name` is the path as given by the user, `path` the resolved location.
pub fn describe_file(name: &str, path: &Path) -> RcvResult<SourceFile> {
    let p = path.display().to_string();
    let mut file = File::open(path).context(OpeningFileSnafu { path: p.clone() })?;
    let mut hasher = Sha256::new();
    let num_bytes = io::copy(&mut file, &mut hasher).context(ReadingFileSnafu { path: p })?;
    let sha256 = hex::encode(hasher.finalize());
    debug!("describe_file: {:?} ({} bytes) sha256: {}", path, num_bytes, sha256);
    Ok(SourceFile {
        name: name.to_string(),
        sha256,
    })
}

pub fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn open_archive(path: &Path) -> RcvResult<ZipArchive<File>> {
    let p = path.display().to_string();
    info!("Opening archive {}", p);
    let file = File::open(path).context(OpeningFileSnafu { path: p.clone() })?;
    ZipArchive::new(file).context(OpeningArchiveSnafu { path: p })
}

/// Reads a member of an archive in full. The member is closed on return.
pub fn read_archive_member(
    archive: &mut ZipArchive<File>,
    path: &Path,
    member: &str,
) -> RcvResult<Vec<u8>> {
    let mut zf = archive.by_name(member).context(MissingArchiveMemberSnafu {
        path: path.display().to_string(),
        member,
    })?;
    let mut bytes: Vec<u8> = Vec::new();
    zf.read_to_end(&mut bytes)
        .context(ReadingArchiveMemberSnafu { member })?;
    debug!("read_archive_member: {}: {} bytes", member, bytes.len());
    Ok(bytes)
}
