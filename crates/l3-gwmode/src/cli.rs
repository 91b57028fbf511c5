//! `l3-gwmode` command line.
//!
//! Each invocation opens the snapshot, runs one command through
//! [`L3NatDb`] and writes the snapshot back if the command changed it.
//! Results are printed as JSON on the given writer; logs go to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand, ValueEnum};
use l3_db::{Context, GatewayInfo, MemoryStore, Router};
use l3_types::{FixedIp, NetworkId, RouterId};
use serde::Serialize;
use tracing::info;

use crate::audit::{AuditCategory, AuditRecord, AUDIT_SOURCE};
use crate::audit_log;
use crate::plugin::L3NatDb;

/// Manage router external gateways and their NAT mode.
#[derive(Parser, Debug)]
#[command(name = "l3-gwmode")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Snapshot file holding routers and ports
    #[arg(long, default_value = "l3-gwmode.json")]
    pub db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty snapshot
    Init {
        /// Overwrite an existing snapshot
        #[arg(long)]
        force: bool,
    },

    /// Create a router without a gateway
    CreateRouter {
        /// Router id (generated when omitted)
        #[arg(long)]
        id: Option<RouterId>,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        tenant: String,
        #[arg(long, action = clap::ArgAction::Set)]
        enable_snat: Option<bool>,
        #[arg(long, action = clap::ArgAction::Set)]
        enable_ipv6_nat: Option<bool>,
    },

    /// Delete a router and its gateway port
    DeleteRouter { router: RouterId },

    /// Show one router
    Show { router: RouterId },

    /// List all routers
    List,

    /// List routers annotated for sync, with gateway ports attached
    SyncList,

    /// Set the external gateway; omitted options keep their stored values
    SetGateway {
        router: RouterId,
        /// External network
        #[arg(long)]
        network: Option<NetworkId>,
        #[arg(long, action = clap::ArgAction::Set)]
        enable_snat: Option<bool>,
        #[arg(long, action = clap::ArgAction::Set)]
        enable_ipv6_nat: Option<bool>,
        /// Gateway address as `subnet=<id>,ip=<addr>` (repeatable)
        #[arg(long = "fixed-ip")]
        fixed_ips: Vec<FixedIp>,
    },

    /// Remove the external gateway (this also turns SNAT off)
    ClearGateway { router: RouterId },
}

impl Command {
    fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::CreateRouter { .. }
                | Command::DeleteRouter { .. }
                | Command::SetGateway { .. }
                | Command::ClearGateway { .. }
        )
    }
}

fn print_json<T: Serialize>(out: &mut dyn Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn init_snapshot(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    MemoryStore::new()
        .save(path)
        .with_context(|| format!("failed to initialize {}", path.display()))?;

    audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, AUDIT_SOURCE, "init_snapshot")
        .with_object_id(path.display().to_string())
        .with_object_type("snapshot"));
    Ok(())
}

/// Runs one command, printing its result to `out`.
pub async fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    if let Command::Init { force } = cli.command {
        init_snapshot(&cli.db, force)?;
        info!("Initialized {}", cli.db.display());
        return Ok(());
    }

    let store = Arc::new(
        MemoryStore::load(&cli.db).with_context(|| format!("failed to open {}", cli.db.display()))?,
    );
    let ctx = Context::new(store.clone());
    let plugin = L3NatDb::with_default_base()?;
    let mutating = cli.command.is_mutating();

    match cli.command {
        // Runs before the snapshot is opened.
        Command::Init { .. } => {}
        Command::CreateRouter {
            id,
            name,
            tenant,
            enable_snat,
            enable_ipv6_nat,
        } => {
            let mut router = Router::new(id.unwrap_or_else(RouterId::generate))
                .with_name(name)
                .with_tenant(tenant);
            if let Some(v) = enable_snat {
                router.enable_snat = v;
            }
            if let Some(v) = enable_ipv6_nat {
                router.enable_ipv6_nat = v;
            }
            print_json(out, &plugin.create_router(&ctx, router)?)?;
        }
        Command::DeleteRouter { router } => {
            plugin.delete_router(&ctx, &router)?;
        }
        Command::Show { router } => {
            print_json(out, &plugin.get_router(&ctx, &router)?)?;
        }
        Command::List => {
            print_json(out, &plugin.get_routers(&ctx)?)?;
        }
        Command::SyncList => {
            print_json(out, &plugin.get_sync_routers(&ctx)?)?;
        }
        Command::SetGateway {
            router,
            network,
            enable_snat,
            enable_ipv6_nat,
            fixed_ips,
        } => {
            let mut info = GatewayInfo {
                network_id: network,
                enable_snat,
                enable_ipv6_nat,
                external_fixed_ips: None,
            };
            for ip in fixed_ips {
                info = info.with_fixed_ip(ip);
            }
            let view = plugin
                .update_router_gateway(&ctx, &router, Some(&info))
                .await?;
            print_json(out, &view)?;
        }
        Command::ClearGateway { router } => {
            let view = plugin.update_router_gateway(&ctx, &router, None).await?;
            print_json(out, &view)?;
        }
    }

    if mutating {
        store
            .save(&cli.db)
            .with_context(|| format!("failed to write {}", cli.db.display()))?;
    }
    Ok(())
}
