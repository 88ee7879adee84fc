//! Windows registry backend for distro registration records.
//!
//! WSL registers each distribution as a GUID-named subkey of
//! `HKCU\SOFTWARE\Microsoft\Windows\CurrentVersion\Lxss`, holding
//! `DistributionName`, `BasePath`, `DefaultUid`, `Flags`, and `Version`
//! values. Only individual DWORD values are ever written back.

use std::ffi::OsString;
use std::os::windows::prelude::*;
use std::path::PathBuf;
use std::ptr::null_mut;

use winapi::shared::minwindef::{DWORD, HKEY};
use winapi::shared::winerror::{ERROR_FILE_NOT_FOUND, ERROR_NO_MORE_ITEMS, ERROR_SUCCESS};
use winapi::um::winnt::{KEY_ENUMERATE_SUB_KEYS, KEY_QUERY_VALUE, KEY_SET_VALUE, REG_DWORD};
use winapi::um::winreg::{
    RegCloseKey, RegEnumKeyExW, RegGetValueW, RegOpenKeyExW, RegSetKeyValueW, HKEY_CURRENT_USER,
    RRF_RT_REG_DWORD, RRF_RT_REG_SZ,
};

use super::{DistroRecord, DistroStore, StoreError};

const LXSS_PATH: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Lxss";

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Store backed by the live Lxss registry key.
pub struct RegistryStore {
    lxss: HKEY,
}

impl RegistryStore {
    /// Open the Lxss key. Fails when WSL has never registered a distro.
    pub fn open() -> Result<Self, StoreError> {
        let mut handle = null_mut();
        let path = to_wide(LXSS_PATH);
        let access = KEY_ENUMERATE_SUB_KEYS | KEY_QUERY_VALUE | KEY_SET_VALUE;
        let status = unsafe {
            RegOpenKeyExW(HKEY_CURRENT_USER, path.as_ptr(), 0, access, &mut handle)
        } as DWORD;

        match status {
            ERROR_SUCCESS => Ok(Self { lxss: handle }),
            ERROR_FILE_NOT_FOUND => Err(StoreError::Registry(
                "no WSL registrations found (Lxss key missing)".to_string(),
            )),
            err => Err(StoreError::Registry(format!(
                "RegOpenKeyExW(Lxss) failed with error {err}"
            ))),
        }
    }

    fn subkeys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut index: DWORD = 0;

        loop {
            let mut name = [0u16; 256];
            let mut len: DWORD = name.len() as DWORD;
            let status = unsafe {
                RegEnumKeyExW(
                    self.lxss,
                    index,
                    name.as_mut_ptr(),
                    &mut len,
                    null_mut(),
                    null_mut(),
                    null_mut(),
                    null_mut(),
                )
            } as DWORD;

            match status {
                ERROR_SUCCESS => {
                    keys.push(
                        OsString::from_wide(&name[..len as usize])
                            .to_string_lossy()
                            .into_owned(),
                    );
                    index += 1;
                }
                ERROR_NO_MORE_ITEMS => return Ok(keys),
                err => {
                    return Err(StoreError::Registry(format!(
                        "RegEnumKeyExW(Lxss) failed with error {err}"
                    )))
                }
            }
        }
    }

    fn read_string(&self, subkey: &str, value: &str) -> Result<Option<String>, StoreError> {
        let subkey_w = to_wide(subkey);
        let value_w = to_wide(value);
        let mut buf = [0u16; 1024];
        let mut len: DWORD = (buf.len() * 2) as DWORD;

        let status = unsafe {
            RegGetValueW(
                self.lxss,
                subkey_w.as_ptr(),
                value_w.as_ptr(),
                RRF_RT_REG_SZ,
                null_mut(),
                buf.as_mut_ptr().cast(),
                &mut len,
            )
        } as DWORD;

        match status {
            ERROR_SUCCESS => {
                let chars = (len as usize / 2).saturating_sub(1);
                Ok(Some(
                    OsString::from_wide(&buf[..chars]).to_string_lossy().into_owned(),
                ))
            }
            ERROR_FILE_NOT_FOUND => Ok(None),
            err => Err(StoreError::Registry(format!(
                "RegGetValueW({subkey}, {value}) failed with error {err}"
            ))),
        }
    }

    fn read_dword(&self, subkey: &str, value: &str) -> Result<Option<u32>, StoreError> {
        let subkey_w = to_wide(subkey);
        let value_w = to_wide(value);
        let mut data: DWORD = 0;
        let mut len: DWORD = 4;

        let status = unsafe {
            RegGetValueW(
                self.lxss,
                subkey_w.as_ptr(),
                value_w.as_ptr(),
                RRF_RT_REG_DWORD,
                null_mut(),
                (&mut data as *mut DWORD).cast(),
                &mut len,
            )
        } as DWORD;

        match status {
            ERROR_SUCCESS => Ok(Some(data)),
            ERROR_FILE_NOT_FOUND => Ok(None),
            err => Err(StoreError::Registry(format!(
                "RegGetValueW({subkey}, {value}) failed with error {err}"
            ))),
        }
    }

    fn write_dword(&self, subkey: &str, value: &str, data: u32) -> Result<(), StoreError> {
        let subkey_w = to_wide(subkey);
        let value_w = to_wide(value);

        let status = unsafe {
            RegSetKeyValueW(
                self.lxss,
                subkey_w.as_ptr(),
                value_w.as_ptr(),
                REG_DWORD,
                (&data as *const u32).cast(),
                4,
            )
        } as DWORD;

        match status {
            ERROR_SUCCESS => Ok(()),
            err => Err(StoreError::Registry(format!(
                "RegSetKeyValueW({subkey}, {value}) failed with error {err}"
            ))),
        }
    }

    /// Find the GUID subkey registered under `name`.
    fn find_subkey(&self, name: &str) -> Result<String, StoreError> {
        for subkey in self.subkeys()? {
            if self.read_string(&subkey, "DistributionName")?.as_deref() == Some(name) {
                return Ok(subkey);
            }
        }
        Err(StoreError::NotFound(name.to_string()))
    }

    fn record_for(&self, subkey: &str) -> Result<Option<DistroRecord>, StoreError> {
        let Some(name) = self.read_string(subkey, "DistributionName")? else {
            return Ok(None);
        };
        let base_path = self
            .read_string(subkey, "BasePath")?
            .map(PathBuf::from)
            .unwrap_or_default();

        Ok(Some(DistroRecord {
            name,
            base_path,
            default_uid: self.read_dword(subkey, "DefaultUid")?.unwrap_or(0),
            flags: self.read_dword(subkey, "Flags")?.unwrap_or(0),
            version: self.read_dword(subkey, "Version")?.unwrap_or(1),
        }))
    }
}

impl Drop for RegistryStore {
    fn drop(&mut self) {
        if !self.lxss.is_null() {
            unsafe { RegCloseKey(self.lxss) };
            self.lxss = null_mut();
        }
    }
}

impl DistroStore for RegistryStore {
    fn list(&self) -> Result<Vec<DistroRecord>, StoreError> {
        let mut records = Vec::new();
        for subkey in self.subkeys()? {
            if let Some(record) = self.record_for(&subkey)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn get(&self, name: &str) -> Result<DistroRecord, StoreError> {
        let subkey = self.find_subkey(name)?;
        self.record_for(&subkey)?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn set_default_uid(&mut self, name: &str, uid: u32) -> Result<(), StoreError> {
        let subkey = self.find_subkey(name)?;
        self.write_dword(&subkey, "DefaultUid", uid)
    }

    fn set_flags(&mut self, name: &str, flags: u32) -> Result<(), StoreError> {
        let subkey = self.find_subkey(name)?;
        self.write_dword(&subkey, "Flags", flags)
    }
}
