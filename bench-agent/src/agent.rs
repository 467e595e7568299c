// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The event-handling surface of the agent.
//!
//! Inbound notifications arrive one at a time; each handler reads current
//! relation state, optionally re-renders configuration, and optionally
//! issues requests or invokes a tool. There is no parallelism and no
//! locking; one logical thread of control touches the agent state.

use crate::config::Config;
use crate::relations::{Outbox, Relations, StoreError};
use crate::render::{self, ActionParams, Render, RenderContext, RenderError};
use crate::state::{Ledger, LedgerError, PersistedState};
use crate::tls::{self, TlsError, TlsMaterialPaths};
use ceph_utils::executor::BoxedExecutor;
use ceph_utils::host::{self, InstallPackagesError};
use ceph_utils::ExecutionError;
use slog::{error, info, Logger};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The client identity the cluster grants capabilities to.
pub const CLIENT_NAME: &str = "client.ceph-benchmarking";

/// [CLIENT_NAME] without the "client." prefix, as the tools expect it.
pub fn client_id() -> &'static str {
    CLIENT_NAME.strip_prefix("client.").unwrap_or(CLIENT_NAME)
}

pub const PACKAGES: &[&str] = &["ceph-common", "fio"];

pub const CEPH_CAPABILITIES: &[&str] =
    &["osd", "allow *", "mon", "allow *", "mgr", "allow *"];

/// Framework notifications the agent reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Install,
    ConfigChanged,
    UpgradeAgent,
    BrokerAvailable,
    PoolsAvailable,
    HasPeers,
    AllowedIpsChanged,
    CaAvailable,
    CertificateReady,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Event::Install => "install",
            Event::ConfigChanged => "config-changed",
            Event::UpgradeAgent => "upgrade-agent",
            Event::BrokerAvailable => "broker-available",
            Event::PoolsAvailable => "pools-available",
            Event::HasPeers => "has-peers",
            Event::AllowedIpsChanged => "allowed-ips-changed",
            Event::CaAvailable => "ca-available",
            Event::CertificateReady => "certificate-ready",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown event {0:?}")]
pub struct ParseEventError(String);

impl FromStr for Event {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let event = match s {
            "install" => Event::Install,
            "config-changed" => Event::ConfigChanged,
            "upgrade-agent" => Event::UpgradeAgent,
            "broker-available" => Event::BrokerAvailable,
            "pools-available" => Event::PoolsAvailable,
            "has-peers" => Event::HasPeers,
            "allowed-ips-changed" => Event::AllowedIpsChanged,
            "ca-available" => Event::CaAvailable,
            "certificate-ready" => Event::CertificateReady,
            other => return Err(ParseEventError(other.to_string())),
        };
        Ok(event)
    }
}

/// How a handler left the triggering event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    /// A precondition was not met; the framework should redeliver the
    /// event once it is.
    Deferred,
}

/// Operator-visible unit status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Active,
    Waiting(String),
    Blocked(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Active => write!(f, "active"),
            Status::Waiting(msg) => write!(f, "waiting: {msg}"),
            Status::Blocked(msg) => write!(f, "blocked: {msg}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Install(#[from] InstallPackagesError),

    #[error("Failed to refresh system trust store: {0}")]
    TrustStore(#[source] ExecutionError),
}

pub struct BenchAgent {
    pub(crate) log: Logger,
    pub(crate) config: Config,
    pub(crate) executor: BoxedExecutor,
    pub(crate) relations: Relations,
    pub(crate) ledger: Ledger<PersistedState>,
}

impl BenchAgent {
    pub fn new(
        log: Logger,
        config: Config,
        executor: BoxedExecutor,
    ) -> Result<Self, AgentError> {
        let relations = Relations::load(&config.relation_store())?;
        let ledger = Ledger::new_with(
            &log,
            config.ledger_paths(),
            PersistedState::default(),
        );
        Ok(Self { log, config, executor, relations, ledger })
    }

    /// Handles one framework notification to completion.
    pub fn dispatch(&mut self, event: Event) -> Result<Outcome, AgentError> {
        info!(self.log, "Dispatching event"; "event" => %event);
        match event {
            Event::Install => self.on_install(),
            Event::ConfigChanged
            | Event::UpgradeAgent
            | Event::PoolsAvailable
            | Event::AllowedIpsChanged => self.render_config(None),
            Event::BrokerAvailable => self.request_ceph_pool(),
            Event::HasPeers => {
                info!(self.log, "Unit has peers");
                Ok(Outcome::Handled)
            }
            Event::CaAvailable => self.on_ca_available(),
            Event::CertificateReady => self.on_certificate_ready(),
        }
    }

    fn on_install(&mut self) -> Result<Outcome, AgentError> {
        if host::is_container(&self.executor) {
            info!(self.log, "Installing into a container is not supported");
            self.update_status();
            return Ok(Outcome::Handled);
        }
        host::install_packages(&self.executor, PACKAGES)?;
        self.update_status();
        Ok(Outcome::Handled)
    }

    /// Issues the pool, capability, and OSD-setting requests. The three are
    /// independent, but are always issued in this order.
    fn request_ceph_pool(&mut self) -> Result<Outcome, AgentError> {
        let mut outbox = Outbox::load(&self.config.outbox())?;
        info!(self.log, "Requesting replicated pool");
        outbox.request_create_pool(&self.config.pool_name);
        info!(self.log, "Requesting permissions");
        outbox.request_ceph_permissions(CLIENT_NAME, CEPH_CAPABILITIES);
        outbox.request_osd_settings(
            [
                ("osd heartbeat grace".to_string(), 20),
                ("osd heartbeat interval".to_string(), 5),
            ]
            .into_iter()
            .collect(),
        );
        outbox.commit(&self.config.outbox())?;
        Ok(Outcome::Handled)
    }

    /// Renders all configuration artifacts, deferring until the cluster
    /// reports pools available.
    pub(crate) fn render_config(
        &mut self,
        action: Option<&ActionParams>,
    ) -> Result<Outcome, AgentError> {
        let mut ctx = RenderContext::new(&self.relations, &self.config);
        if let Some(params) = action {
            ctx = ctx.with_action(params);
        }
        match render::render_config(&self.log, &self.config, &ctx)? {
            Render::Deferred => return Ok(Outcome::Deferred),
            Render::Rendered => {}
        }

        let mut outbox = Outbox::load(&self.config.outbox())?;
        outbox.announce_ready = true;
        outbox.commit(&self.config.outbox())?;

        info!(self.log, "Setting started state");
        self.ledger.data_mut().is_started = true;
        self.ledger.commit()?;
        self.update_status();
        Ok(Outcome::Handled)
    }

    fn on_ca_available(&mut self) -> Result<Outcome, AgentError> {
        let mut addresses = BTreeSet::new();
        for binding in
            [&self.config.bindings.public, &self.config.bindings.cluster]
        {
            addresses.insert(binding.ingress_address.to_string());
            addresses.insert(binding.bind_address.to_string());
        }
        let mut sans: Vec<String> = addresses.into_iter().collect();
        sans.push(self.hostname());

        let mut outbox = Outbox::load(&self.config.outbox())?;
        outbox.request_application_certificate(&self.fqdn(), sans);
        outbox.commit(&self.config.outbox())?;
        Ok(Outcome::Handled)
    }

    fn on_certificate_ready(&mut self) -> Result<Outcome, AgentError> {
        let paths = TlsMaterialPaths::from_config(&self.config);
        tls::write_material(&self.log, &paths, &self.relations.certificates)?;
        host::refresh_trust_store(&self.executor)
            .map_err(AgentError::TrustStore)?;
        self.ledger.data_mut().enable_tls = true;
        self.ledger.commit()?;
        self.render_config(None)
    }

    /// Computes the operator-visible status of this unit.
    pub fn status(&self) -> Status {
        if host::is_container(&self.executor) {
            return Status::Blocked(
                "Some agent actions cannot be performed when deployed in a \
                 container"
                    .to_string(),
            );
        }
        if !self.relations.ceph_client.pools_available {
            return Status::Waiting("pools not available".to_string());
        }
        if self.ledger.data().is_started {
            Status::Active
        } else {
            Status::Waiting("configuration not rendered".to_string())
        }
    }

    pub(crate) fn update_status(&self) {
        info!(self.log, "Unit status"; "status" => %self.status());
    }

    pub(crate) fn hostname(&self) -> String {
        self.config.hostname.clone().unwrap_or_else(|| {
            gethostname::gethostname()
                .into_string()
                .unwrap_or_else(|_| "localhost".to_string())
        })
    }

    fn fqdn(&self) -> String {
        self.config.fqdn.clone().unwrap_or_else(|| self.hostname())
    }

    pub(crate) fn fail_action(&self, msg: String) -> crate::actions::ActionFailed {
        error!(self.log, "{msg}");
        crate::actions::ActionFailed { stderr: msg, code: "1".to_string() }
    }
}
