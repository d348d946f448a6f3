//! Packs the `installer/` resources tree into a gzip tarball embedded in the
//! binary. Symlinks are stored as links, never followed.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;

const TARBALL_NAME: &str = "installer.tar.gz";

fn installer_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TSSC_INSTALLER_DIR") {
        return PathBuf::from(dir);
    }
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../installer")
}

fn main() -> io::Result<()> {
    let src = installer_dir();
    println!("cargo:rerun-if-changed={}", src.display());
    println!("cargo:rerun-if-env-changed=TSSC_INSTALLER_DIR");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").map_err(io::Error::other)?);
    let encoder = GzEncoder::new(File::create(out_dir.join(TARBALL_NAME))?, Compression::best());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut entries: Vec<_> = WalkDir::new(&src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(io::Error::other)?;
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    for entry in entries {
        let rel = entry
            .path()
            .strip_prefix(&src)
            .map_err(io::Error::other)?
            .to_string_lossy()
            .replace('\\', "/");
        println!("cargo:rerun-if-changed={}", entry.path().display());

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            builder.append_link(&mut header, &rel, target)?;
        } else if file_type.is_dir() {
            builder.append_dir(&rel, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), &rel)?;
        }
    }

    builder.into_inner()?.finish()?;
    Ok(())
}
