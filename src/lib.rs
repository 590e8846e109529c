//! # zbgate - Serial Gateway for XBee ZB Mesh Radio Networks
//!
//! zbgate connects an XBee ZB radio module on a serial port to higher-level
//! consumers. It implements the radio's binary API-frame protocol end to
//! end: frame reassembly from an arbitrarily-chunked byte stream, checksum
//! validation with resynchronization, per-frame-type dispatch, transmit
//! status correlation, and timed node-discovery sweeps over the mesh.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zbgate::config::Config;
//! use zbgate::radio::{RadioController, RadioEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let (mut controller, mut events) = RadioController::new(&config.gateway);
//!     controller.open_device(&config.serial)?;
//!     controller.start_run_loop()?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             RadioEvent::DataReceived { address, payload } => {
//!                 println!("{:016X}: {} bytes", address, payload.len());
//!             }
//!             RadioEvent::LocalAddressKnown(address) => {
//!                 println!("local radio is {:016X}", address);
//!             }
//!             RadioEvent::DiscoveryCompleted(nodes) => {
//!                 println!("{} nodes on the mesh", nodes.len());
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`radio`] - the protocol engine: codec, framer, node table, controller
//! - [`config`] - TOML configuration management
//! - [`logutil`] - log sanitization and frame hex dumps
//!
//! ## Architecture
//!
//! ```text
//! serial bytes ──► Framer ──► dispatch ──► Node Table ──► RadioEvent
//!                                 │             ▲          subscribers
//!                                 └── pending ──┘
//! send/discover ──► outbound queue ──► scheduler tick ──► serial port
//! ```

pub mod config;
pub mod logutil;
pub mod radio;
