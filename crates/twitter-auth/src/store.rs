//! Durable account storage
//!
//! One JSON file per account under a directory, named after the username.
//! All writes use atomic temp-file + rename so a crash never leaves a torn
//! record. A tokio Mutex serializes writers; reads go straight to disk.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::error::{Error, Result};

const ACCOUNT_EXT: &str = "json";

/// Directory-backed account store.
pub struct AccountStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl AccountStore {
    /// Open the store rooted at `dir`, creating the directory if missing.
    pub async fn open(dir: PathBuf) -> Result<Self> {
        if !dir.exists() {
            info!(dir = %dir.display(), "account directory not found, creating it");
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| Error::Io(format!("creating account directory: {e}")))?;
        }
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every account record, sorted by username.
    pub async fn load_all(&self) -> Result<Vec<Account>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::Io(format!("listing account directory: {e}")))?;

        let mut accounts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Io(format!("listing account directory: {e}")))?
        {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == ACCOUNT_EXT)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_record {
                continue;
            }
            accounts.push(read_account(&path).await?);
        }

        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        info!(dir = %self.dir.display(), accounts = accounts.len(), "loaded accounts");
        Ok(accounts)
    }

    /// Load one account, `None` if no record exists.
    pub async fn load(&self, username: &str) -> Result<Option<Account>> {
        let path = self.path_for(username)?;
        if !path.exists() {
            return Ok(None);
        }
        read_account(&path).await.map(Some)
    }

    /// Create or replace the record for `account.username`.
    pub async fn save(&self, account: &Account) -> Result<()> {
        let path = self.path_for(&account.username)?;
        let _guard = self.write_lock.lock().await;
        write_atomic(&path, account).await
    }

    /// Insert a new account. Fails if the username is already stored.
    pub async fn add(&self, account: &Account) -> Result<()> {
        let path = self.path_for(&account.username)?;
        let _guard = self.write_lock.lock().await;
        if path.exists() {
            return Err(Error::AlreadyExists(account.username.clone()));
        }
        debug!(username = %account.username, "added account");
        write_atomic(&path, account).await
    }

    /// Delete an account record, returning it if it existed.
    pub async fn remove(&self, username: &str) -> Result<Option<Account>> {
        let path = self.path_for(username)?;
        let _guard = self.write_lock.lock().await;
        if !path.exists() {
            return Ok(None);
        }
        let account = read_account(&path).await?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Error::Io(format!("removing account file: {e}")))?;
        debug!(username, "removed account");
        Ok(Some(account))
    }

    fn path_for(&self, username: &str) -> Result<PathBuf> {
        let valid = !username.is_empty()
            && !username.starts_with('.')
            && !username.contains(['/', '\\']);
        if !valid {
            return Err(Error::AccountParse(format!(
                "invalid username for storage: {username:?}"
            )));
        }
        Ok(self.dir.join(format!("{username}.{ACCOUNT_EXT}")))
    }
}

async fn read_account(path: &Path) -> Result<Account> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(format!("reading {}: {e}", path.display())))?;
    let account: Account = serde_json::from_str(&contents)
        .map_err(|e| Error::AccountParse(format!("parsing {}: {e}", path.display())))?;

    let expected = path.file_stem().and_then(|s| s.to_str());
    if expected != Some(account.username.as_str()) {
        warn!(
            path = %path.display(),
            username = %account.username,
            "account file name does not match username"
        );
    }
    Ok(account)
}

/// Write one account record atomically with 0600 permissions.
async fn write_atomic(path: &Path, account: &Account) -> Result<()> {
    let json = serde_json::to_string_pretty(account)
        .map_err(|e| Error::AccountParse(format!("serializing account: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("account path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp account file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting account file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp account file: {e}")))?;

    debug!(path = %path.display(), "persisted account");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn test_account(username: &str) -> Account {
        Account::new(username, "pw", format!("{username}@example.com"), "epw")
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(dir.path().to_path_buf()).await.unwrap();

        let mut account = test_account("alice");
        account.active = true;
        account.cookies.insert("ct0".into(), "csrf".into());
        account.locks.insert("Followers".into(), true);
        account.limits.insert(
            "SearchTimeline".into(),
            Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
        );
        store.save(&account).await.unwrap();

        let reopened = AccountStore::open(dir.path().to_path_buf()).await.unwrap();
        let loaded = reopened.load("alice").await.unwrap().unwrap();
        assert_eq!(loaded, account);
    }

    #[tokio::test]
    async fn limits_are_stored_as_utc_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(dir.path().to_path_buf()).await.unwrap();

        let mut account = test_account("alice");
        account.limits.insert(
            "SearchTimeline".into(),
            Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
        );
        store.save(&account).await.unwrap();

        let raw = tokio::fs::read_to_string(dir.path().join("alice.json"))
            .await
            .unwrap();
        assert!(raw.contains("2030-01-02T03:04:05Z"), "got: {raw}");
    }

    #[tokio::test]
    async fn cold_start_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let accounts_dir = dir.path().join("nested").join("accounts");

        assert!(!accounts_dir.exists());
        let store = AccountStore::open(accounts_dir.clone()).await.unwrap();
        assert!(accounts_dir.is_dir());
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_rejects_duplicate_username() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(dir.path().to_path_buf()).await.unwrap();

        store.add(&test_account("alice")).await.unwrap();
        let result = store.add(&test_account("alice")).await;
        assert!(matches!(result, Err(Error::AlreadyExists(name)) if name == "alice"));
    }

    #[tokio::test]
    async fn add_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(dir.path().to_path_buf()).await.unwrap();

        store.add(&test_account("alice")).await.unwrap();
        store.add(&test_account("bob")).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 2);

        let removed = store.remove("alice").await.unwrap();
        assert_eq!(removed.map(|a| a.username), Some("alice".to_string()));
        assert_eq!(store.load_all().await.unwrap().len(), 1);

        assert!(store.remove("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_all_is_sorted_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(dir.path().to_path_buf()).await.unwrap();

        store.add(&test_account("carol")).await.unwrap();
        store.add(&test_account("alice")).await.unwrap();
        store.add(&test_account("bob")).await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "ignore me")
            .await
            .unwrap();

        let names: Vec<_> = store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.username)
            .collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn malformed_record_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(dir.path().to_path_buf()).await.unwrap();
        tokio::fs::write(dir.path().join("broken.json"), "{not json")
            .await
            .unwrap();

        let result = store.load_all().await;
        assert!(matches!(result, Err(Error::AccountParse(_))));
    }

    #[tokio::test]
    async fn rejects_path_like_usernames() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(dir.path().to_path_buf()).await.unwrap();

        for bad in ["", "../escape", "a/b", ".hidden"] {
            let result = store.save(&test_account(bad)).await;
            assert!(matches!(result, Err(Error::AccountParse(_))), "{bad:?}");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(dir.path().to_path_buf()).await.unwrap();
        store.add(&test_account("alice")).await.unwrap();

        let metadata = tokio::fs::metadata(dir.path().join("alice.json"))
            .await
            .unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "account file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AccountStore::open(dir.path().to_path_buf()).await.unwrap());

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.add(&test_account(&format!("acct-{i}"))).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.load_all().await.unwrap().len(), 10);
    }
}
