// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform bridges for the local backend

use std::sync::Arc;

use vfa_core::{PlatformBridge, PortablePlatform};

#[cfg(unix)]
pub use unix::UnixPlatform;

/// Bridge for the operating system this was built for.
pub fn native_platform() -> Arc<dyn PlatformBridge> {
    #[cfg(unix)]
    {
        Arc::new(UnixPlatform)
    }

    #[cfg(not(unix))]
    {
        Arc::new(PortablePlatform)
    }
}

/// Bridge that only knows the read-only flag, whatever the OS.
pub fn portable_platform() -> Arc<dyn PlatformBridge> {
    Arc::new(PortablePlatform)
}

#[cfg(unix)]
mod unix {
    use std::ffi::{CStr, CString};
    use std::fs;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use std::path::Path;

    use vfa_core::{FilePermissions, PermissionMask, PlatformBridge, SpaceInfo, VfaError, VfaResult};

    /// Full mode bits, ownership and `statvfs` space figures
    #[derive(Debug, Default, Clone, Copy)]
    pub struct UnixPlatform;

    fn c_path(path: &Path) -> VfaResult<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|_| VfaError::MalformedLocation(format!("NUL in path {}", path.display())))
    }

    fn user_name(uid: u32) -> Option<String> {
        let mut buf = vec![0 as libc::c_char; 1024];
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        // SAFETY: every pointer refers to a live local of the right size.
        let rc = unsafe {
            libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if rc != 0 || result.is_null() {
            return None;
        }
        // SAFETY: on success pw_name points into `buf`, NUL terminated.
        let name = unsafe { CStr::from_ptr(pwd.pw_name) };
        Some(name.to_string_lossy().into_owned())
    }

    fn group_name(gid: u32) -> Option<String> {
        let mut buf = vec![0 as libc::c_char; 1024];
        let mut grp: libc::group = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();
        // SAFETY: every pointer refers to a live local of the right size.
        let rc = unsafe {
            libc::getgrgid_r(gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if rc != 0 || result.is_null() {
            return None;
        }
        // SAFETY: on success gr_name points into `buf`, NUL terminated.
        let name = unsafe { CStr::from_ptr(grp.gr_name) };
        Some(name.to_string_lossy().into_owned())
    }

    impl PlatformBridge for UnixPlatform {
        fn name(&self) -> &str {
            "unix"
        }

        fn readable_permissions(&self) -> PermissionMask {
            PermissionMask::ALL
        }

        fn changeable_permissions(&self) -> PermissionMask {
            PermissionMask::ALL
        }

        fn permissions(&self, metadata: &fs::Metadata) -> FilePermissions {
            FilePermissions::from_mode(metadata.mode())
        }

        fn set_permissions(&self, path: &Path, mode: u16) -> VfaResult<()> {
            fs::set_permissions(path, fs::Permissions::from_mode(u32::from(mode & 0o777)))
                .map_err(|e| VfaError::from_io(e, path.display().to_string()))
        }

        fn owner(&self, metadata: &fs::Metadata) -> (Option<String>, Option<String>) {
            let uid = metadata.uid();
            let gid = metadata.gid();
            (
                Some(user_name(uid).unwrap_or_else(|| uid.to_string())),
                Some(group_name(gid).unwrap_or_else(|| gid.to_string())),
            )
        }

        fn supports_space_queries(&self) -> bool {
            true
        }

        #[allow(clippy::unnecessary_cast)]
        fn volume_space(&self, path: &Path) -> VfaResult<SpaceInfo> {
            let c_path = c_path(path)?;
            let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
            // SAFETY: `c_path` is NUL terminated and `stat` is a valid out pointer.
            let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
            if rc != 0 {
                return Err(VfaError::from_io(
                    io::Error::last_os_error(),
                    path.display().to_string(),
                ));
            }
            let block = stat.f_frsize as u64;
            Ok(SpaceInfo {
                total: stat.f_blocks as u64 * block,
                free: stat.f_bavail as u64 * block,
            })
        }
    }

}
