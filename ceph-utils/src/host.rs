// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host plumbing: package installation, container detection, and the
//! system trust store.

use crate::executor::BoxedExecutor;
use crate::{ExecutionError, APT_GET, SYSTEMD_DETECT_VIRT, UPDATE_CA_CERTIFICATES};

/// Error returned by [install_packages].
#[derive(thiserror::Error, Debug)]
#[error("Failed to install packages {packages:?}: {err}")]
pub struct InstallPackagesError {
    pub packages: Vec<String>,
    #[source]
    pub err: ExecutionError,
}

/// Returns true when the host is a container.
///
/// Detection failure (including a missing `systemd-detect-virt`) reads as
/// "not a container"; the worst case is an install attempt that the package
/// manager rejects.
pub fn is_container(executor: &BoxedExecutor) -> bool {
    let mut command = std::process::Command::new(SYSTEMD_DETECT_VIRT);
    let cmd = command.args(["--quiet", "--container"]);
    executor.execute(cmd).is_ok()
}

/// Installs the given packages, non-interactively.
pub fn install_packages(
    executor: &BoxedExecutor,
    packages: &[&str],
) -> Result<(), InstallPackagesError> {
    let mut command = std::process::Command::new(APT_GET);
    let cmd = command.args(["install", "-y"]).args(packages);
    executor.execute(cmd).map_err(|err| InstallPackagesError {
        packages: packages.iter().map(|p| p.to_string()).collect(),
        err,
    })?;
    Ok(())
}

/// Refreshes the system trust store after a CA certificate lands in it.
pub fn refresh_trust_store(
    executor: &BoxedExecutor,
) -> Result<(), ExecutionError> {
    let mut command = std::process::Command::new(UPDATE_CA_CERTIFICATES);
    executor.execute(&mut command)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FakeExecutor, StaticHandler};
    use crate::testing::log;

    #[test]
    fn container_detection_degrades_to_false() {
        let executor = FakeExecutor::new(log());
        let mut handler = StaticHandler::new();
        handler.expect_fail(format!("{SYSTEMD_DETECT_VIRT} --quiet --container"));
        handler.register(&executor);

        assert!(!is_container(&(executor.as_executor())));
    }

    #[test]
    fn install_packages_passes_package_list() {
        let executor = FakeExecutor::new(log());
        let mut handler = StaticHandler::new();
        handler.expect_ok(format!("{APT_GET} install -y ceph-common fio"));
        handler.register(&executor);

        install_packages(&(executor.as_executor()), &["ceph-common", "fio"])
            .expect("install should succeed");
    }
}
