//! Install steps 1–2 (`spec.md` §4.8): fetch the archive to the packages directory and
//! verify its digest. `entomb_archive::Fetcher` already embeds the digest check in its
//! mirror loop (`spec.md` §4.7), so the two steps collapse into one call here; a
//! mismatch that exhausts every mirror is reported as the `Fetch` step, not a separate
//! `Checksum` step.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use entomb_archive::{FetchOutcome, Fetcher};

use crate::error::{ExecError, InstallStep, InstallStepError};

pub fn fetch_archive(
    fetcher: &Fetcher,
    key_slot_text: &str,
    mirrors: &[String],
    relative_path: &str,
    dest: &Path,
    expected_md5: Option<&str>,
    cancel: &AtomicBool,
) -> Result<FetchOutcome, InstallStepError> {
    fetcher
        .fetch(mirrors, relative_path, dest, expected_md5, cancel)
        .map_err(|source| InstallStepError {
            step: InstallStep::Fetch,
            key_slot: key_slot_text.to_string(),
            source: ExecError::Fetch(source),
        })
}
