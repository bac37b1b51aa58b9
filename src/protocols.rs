//! Protocol adapters.
//!
//! Each adapter implements the [`crate::core::traits::DataClient`]
//! contract for one protocol tag. The stub adapter is always compiled;
//! the heavy transports are feature-gated.

pub mod opc_classic;

#[cfg(feature = "opcua")]
#[cfg_attr(docsrs, doc(cfg(feature = "opcua")))]
pub mod opcua;

#[cfg(feature = "websocket")]
#[cfg_attr(docsrs, doc(cfg(feature = "websocket")))]
pub mod websocket;
