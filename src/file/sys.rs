//! Account lookups, access checks, extended attributes and filesystem
//! statistics shared by the local backend and the record mutators.

use std::io;
use std::path::Path;

use nix::sys::statvfs::statvfs as nix_statvfs;
use nix::unistd::{AccessFlags, Uid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub uid: u32,
    pub gid: u32,
    pub name: String,
    /// First field of the GECOS entry, if any.
    pub real_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub gid: u32,
    pub name: String,
}

fn real_name(uid: u32) -> Option<String> {
    let user = nix::unistd::User::from_uid(Uid::from_raw(uid)).ok()??;
    let gecos = user.gecos.to_string_lossy().into_owned();
    gecos
        .split(',')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn user_entry(user: &uzers::User) -> UserEntry {
    UserEntry {
        uid: user.uid(),
        gid: user.primary_group_id(),
        name: user.name().to_string_lossy().into_owned(),
        real_name: real_name(user.uid()),
    }
}

fn group_entry(group: &uzers::Group) -> GroupEntry {
    GroupEntry {
        gid: group.gid(),
        name: group.name().to_string_lossy().into_owned(),
    }
}

pub fn user_by_uid(uid: u32) -> Option<UserEntry> {
    uzers::get_user_by_uid(uid).map(|u| user_entry(&u))
}

pub fn user_by_name(name: &str) -> Option<UserEntry> {
    uzers::get_user_by_name(name).map(|u| user_entry(&u))
}

pub fn group_by_gid(gid: u32) -> Option<GroupEntry> {
    uzers::get_group_by_gid(gid).map(|g| group_entry(&g))
}

pub fn group_by_name(name: &str) -> Option<GroupEntry> {
    uzers::get_group_by_name(name).map(|g| group_entry(&g))
}

pub fn effective_uid() -> u32 {
    uzers::get_effective_uid()
}

/// Supplementary groups of the calling process plus its effective gid.
pub fn current_groups() -> Vec<u32> {
    let mut groups: Vec<u32> = match nix::unistd::getgroups() {
        Ok(groups) => groups.into_iter().map(|g| g.as_raw()).collect(),
        Err(e) => {
            log::warn!("getgroups failed: {}", e);
            Vec::new()
        }
    };
    let egid = uzers::get_effective_gid();
    if !groups.contains(&egid) {
        groups.push(egid);
    }
    groups
}

pub fn can_read(path: &Path) -> bool {
    nix::unistd::access(path, AccessFlags::R_OK).is_ok()
}

pub fn can_write(path: &Path) -> bool {
    nix::unistd::access(path, AccessFlags::W_OK).is_ok()
}

pub fn can_execute(path: &Path) -> bool {
    nix::unistd::access(path, AccessFlags::X_OK).is_ok()
}

/// Whether entries of directory `path` can be created and removed.
pub fn can_modify_entries(path: &Path) -> bool {
    nix::unistd::access(path, AccessFlags::W_OK | AccessFlags::X_OK).is_ok()
}

fn xattrs_unsupported(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOTSUP) | Some(libc::ENODATA))
}

/// The value of extended attribute `name`, without following symlinks.
pub fn get_xattr(path: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
    match xattr::get(path, name) {
        Ok(value) => Ok(value),
        Err(e) if xattrs_unsupported(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn list_xattrs(path: &Path) -> io::Result<Vec<String>> {
    match xattr::list(path) {
        Ok(names) => Ok(names.map(|n| n.to_string_lossy().into_owned()).collect()),
        Err(e) if e.raw_os_error() == Some(libc::ENOTSUP) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

pub fn set_xattr(path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
    xattr::set(path, name, value)
}

pub fn remove_xattr(path: &Path, name: &str) -> io::Result<()> {
    match xattr::remove(path, name) {
        Err(e) if e.raw_os_error() == Some(libc::ENODATA) => Ok(()),
        other => other,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FsStats {
    pub free: u64,
    pub size: u64,
}

pub fn statvfs(path: &Path) -> io::Result<FsStats> {
    let st = nix_statvfs(path).map_err(io::Error::from)?;
    let fragment = st.fragment_size() as u64;
    Ok(FsStats {
        free: st.blocks_available() as u64 * fragment,
        size: st.blocks() as u64 * fragment,
    })
}

/// Changes owner and/or group of `path` itself, not of a symlink target.
pub fn chown(path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    std::os::unix::fs::lchown(path, uid, gid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_user_resolves() {
        let root = user_by_uid(0).expect("uid 0 exists");
        assert_eq!(root.name, "root");
        assert_eq!(user_by_name("root").map(|u| u.uid), Some(0));
        assert!(user_by_name("no-such-user-npfm").is_none());
        assert_eq!(group_by_gid(0).map(|g| g.name).as_deref(), Some("root"));
    }

    #[test]
    fn current_groups_include_egid() {
        assert!(current_groups().contains(&uzers::get_effective_gid()));
    }

    #[test]
    fn statvfs_reports_sizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stats = statvfs(dir.path()).expect("statvfs");
        assert!(stats.size > 0);
        assert!(stats.free <= stats.size);
    }

    #[test]
    fn missing_xattr_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("plain");
        std::fs::write(&file, b"").expect("write");
        assert_eq!(get_xattr(&file, "user.npfm.absent").expect("get"), None);
    }
}
