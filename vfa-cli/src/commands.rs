// SPDX-License-Identifier: AGPL-3.0-or-later
//! CLI command implementations

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use console::style;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tabled::{Table, Tabled};

use vfa_core::ordering::sort_nodes;
use vfa_core::{EntryKind, Metadata, Node, Operation, SortCriterion, VfaError, VfaResult, Vfs};

/// Resolve a command-line argument: a URL, an absolute path, or a path
/// relative to the working directory.
fn resolve(vfs: &Vfs, arg: &str) -> VfaResult<Arc<Node>> {
    if arg.contains("://") || Path::new(arg).is_absolute() {
        return vfs.resolve(arg);
    }
    let cwd = std::env::current_dir()?;
    vfs.resolve_path(&cwd.join(arg))
}

fn require(node: &Node) -> VfaResult<Metadata> {
    node.metadata()?
        .ok_or_else(|| VfaError::NotFound(node.location().to_string()))
}

/// Format a timestamp for display
fn format_time(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_kind(node: &Node, kind: EntryKind) -> String {
    match kind {
        EntryKind::Directory => style("d").cyan().to_string(),
        EntryKind::File if node.is_archive() => style("a").yellow().to_string(),
        EntryKind::File => "-".to_string(),
        EntryKind::Symlink => style("l").magenta().to_string(),
        EntryKind::Unknown => "?".to_string(),
    }
}

#[derive(Tabled)]
struct LsEntry {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Permissions")]
    perms: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Name")]
    name: String,
}

/// List directory or archive contents
pub fn ls(
    vfs: &Vfs,
    path: &str,
    long: bool,
    sort: SortCriterion,
    desc: bool,
    dirs_first: bool,
) -> VfaResult<()> {
    let node = resolve(vfs, path)?;
    tracing::debug!("Listing {}", node);

    let children = sort_nodes(node.ls()?, sort, !desc, dirs_first)?;
    if children.is_empty() {
        println!("(empty directory)");
        return Ok(());
    }

    if long {
        let mut rows = Vec::with_capacity(children.len());
        for child in &children {
            let Some(meta) = child.metadata()? else {
                continue;
            };
            rows.push(LsEntry {
                kind: format_kind(child, meta.kind),
                perms: meta.permissions.map_or_else(|| "-".to_string(), |p| p.to_string()),
                size: ByteSize(meta.display_size()).to_string(),
                modified: format_time(meta.modified),
                name: child.name().to_string(),
            });
        }
        println!("{}", Table::new(rows));
    } else {
        for child in &children {
            println!("{}", child.name());
        }
    }
    Ok(())
}

/// Display file contents
pub fn cat(vfs: &Vfs, path: &str) -> VfaResult<()> {
    let node = resolve(vfs, path)?;
    let mut input = node.input()?;
    let mut stdout = io::stdout().lock();
    io::copy(&mut input, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Destination for a transfer: inside `dest` when it is a directory.
fn transfer_target(source: &Node, dest: Arc<Node>, force: bool) -> VfaResult<Arc<Node>> {
    let dest = match dest.metadata()? {
        Some(meta) if meta.is_directory() => dest.child(source.name())?,
        _ => dest,
    };
    if !force && dest.exists()? {
        return Err(VfaError::AlreadyExists(format!("{dest} (use --force to replace)")));
    }
    Ok(dest)
}

/// Copy files or directory trees
pub fn cp(vfs: &Vfs, source: &str, dest: &str, force: bool) -> VfaResult<()> {
    let src = resolve(vfs, source)?;
    let dst = transfer_target(&src, resolve(vfs, dest)?, force)?;
    src.copy_to(&dst)?;
    println!("Copied {src} -> {dst}");
    Ok(())
}

/// Move or rename
pub fn mv(vfs: &Vfs, source: &str, dest: &str, force: bool) -> VfaResult<()> {
    let src = resolve(vfs, source)?;
    let dst = transfer_target(&src, resolve(vfs, dest)?, force)?;
    src.move_to(&dst)?;
    println!("Moved {src} -> {dst}");
    Ok(())
}

/// Remove files or empty directories
pub fn rm(vfs: &Vfs, paths: &[String]) -> VfaResult<()> {
    for path in paths {
        let node = resolve(vfs, path)?;
        node.delete()?;
        println!("Removed {path}");
    }
    Ok(())
}

/// Create directories
pub fn mkdir(vfs: &Vfs, paths: &[String], parents: bool) -> VfaResult<()> {
    for path in paths {
        let node = resolve(vfs, path)?;
        if parents {
            node.mkdirs()?;
        } else {
            node.mkdir()?;
        }
        println!("Created {path}");
    }
    Ok(())
}

/// Show file or directory information
pub fn stat(vfs: &Vfs, path: &str) -> VfaResult<()> {
    let node = resolve(vfs, path)?;
    let meta = require(&node)?;

    println!("  Location: {}", node);
    println!("  Type: {:?}", meta.kind);
    println!("  Size: {} ({})", meta.display_size(), ByteSize(meta.display_size()));
    if let Some(perms) = meta.permissions {
        println!("  Mode: {:03o} ({})", perms.to_mode(), perms);
    }
    println!("  Modified: {}", format_time(meta.modified));
    if let Some(owner) = &meta.owner {
        println!("  Owner: {owner}");
    }
    if let Some(group) = &meta.group {
        println!("  Group: {group}");
    }
    if let Some(layer) = node.archive_layer() {
        let readable = node.is_readable_archive()?;
        println!("  Archive: {} ({})", layer.format().name(), if readable { "browsable" } else { "unreadable" });
    }
    if node.is_archive_entry() {
        println!("  Inside archive: yes");
    }
    Ok(())
}

/// Print a content digest
pub fn checksum(vfs: &Vfs, path: &str, algorithm: Option<&str>) -> VfaResult<()> {
    let node = resolve(vfs, path)?;
    let algorithm = algorithm.unwrap_or(&vfs.config().default_checksum);
    let digest = node.checksum(algorithm)?;
    println!("{digest}  {}", node.name());
    Ok(())
}

/// Show which operations a path supports
pub fn caps(vfs: &Vfs, path: &str) -> VfaResult<()> {
    let node = resolve(vfs, path)?;
    let supported = node.capabilities();
    println!("Capabilities of {node}:");
    for op in Operation::ALL {
        let mark = if supported.contains(op) {
            style("yes").green()
        } else {
            style("no").red()
        };
        println!("  {:<18} {}", op.name(), mark);
    }
    Ok(())
}

/// Show storage space information
pub fn df(vfs: &Vfs, path: &str) -> VfaResult<()> {
    let node = resolve(vfs, path)?;
    println!("Storage for {node}");

    if !node.supports(Operation::GetTotalSpace) || !node.supports(Operation::GetFreeSpace) {
        println!("  Space information not available for this location");
        return Ok(());
    }

    let total = node.total_space()?;
    let free = node.free_space()?;
    let used = total.saturating_sub(free);
    let pct = if total == 0 { 0.0 } else { (used as f64 / total as f64) * 100.0 };
    println!("  Total:     {}", ByteSize(total));
    println!("  Used:      {} ({:.1}%)", ByteSize(used), pct);
    println!("  Available: {}", ByteSize(free));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vfa_core::VfsConfig;

    fn vfs() -> Vfs {
        vfa_providers::default_vfs(VfsConfig::default())
    }

    #[test]
    fn test_copy_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        let vfs = vfs();

        let src = dir.path().join("a.txt");
        let out = dir.path().join("out");
        cp(&vfs, &src.to_string_lossy(), &out.to_string_lossy(), false).unwrap();
        assert_eq!(std::fs::read(out.join("a.txt")).unwrap(), b"abc");

        // A second copy needs --force.
        let again = cp(&vfs, &src.to_string_lossy(), &out.to_string_lossy(), false);
        assert!(matches!(again, Err(VfaError::AlreadyExists(_))));
        cp(&vfs, &src.to_string_lossy(), &out.to_string_lossy(), true).unwrap();
    }

    #[test]
    fn test_mkdir_parents_and_rm() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs();
        let deep = dir.path().join("x/y/z").to_string_lossy().into_owned();

        assert!(mkdir(&vfs, &[deep.clone()], false).is_err());
        mkdir(&vfs, &[deep.clone()], true).unwrap();
        assert!(dir.path().join("x/y/z").is_dir());

        rm(&vfs, &[deep]).unwrap();
        assert!(!dir.path().join("x/y/z").exists());
        let parent = dir.path().join("x").to_string_lossy().into_owned();
        assert!(matches!(rm(&vfs, &[parent]), Err(VfaError::DirectoryNotEmpty(_))));
    }

    #[test]
    fn test_move_between_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs();
        let mem = vfs.resolve("mem:///note.txt").unwrap();
        mem.output().unwrap().write_all(b"in memory").unwrap();

        let target = dir.path().join("note.txt");
        mv(&vfs, "mem:///note.txt", &target.to_string_lossy(), false).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"in memory");
        assert!(!mem.exists().unwrap());
    }

    #[test]
    fn test_commands_on_missing_path() {
        let vfs = vfs();
        assert!(matches!(stat(&vfs, "mem:///nothing"), Err(VfaError::NotFound(_))));
        assert!(matches!(
            checksum(&vfs, "mem:///nothing", Some("MD5")),
            Err(VfaError::NotFound(_))
        ));
        assert!(df(&vfs, "mem:///").is_ok());
    }
}
