//! Flow descriptor module.
//!
//! The immutable query handed to the evaluator: protocol, destination port,
//! how the destination is addressed and an optional ephemeral range.

use std::net::IpAddr;

use crate::error::{ReachError, Result};
use crate::parser::{ordered, parse_port_range, parse_protocol};
use crate::types::{PortRange, Protocol};

/// How the source addresses the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// The destination's public address; traffic leaves the private network
    PublicAddress,
    /// A specific private address of the destination
    PrivateAddress(IpAddr),
}

/// A single flow to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowDescriptor {
    pub protocol: Protocol,
    pub port: u16,
    pub mode: AddressingMode,
    /// Overrides the evaluator's ephemeral range for the return leg
    pub ephemeral_range: Option<PortRange>,
}

impl FlowDescriptor {
    pub fn builder() -> FlowDescriptorBuilder {
        FlowDescriptorBuilder::default()
    }

    /// Destination port as a one-port range
    pub fn destination_ports(&self) -> PortRange {
        PortRange::single(self.port)
    }

    pub fn is_public(&self) -> bool {
        matches!(self.mode, AddressingMode::PublicAddress)
    }
}

/// Builder validating the addressing mode and required fields.
#[derive(Debug, Clone, Default)]
pub struct FlowDescriptorBuilder {
    protocol: Option<Protocol>,
    port: Option<u16>,
    use_public_address: bool,
    private_address: Option<IpAddr>,
    ephemeral_range: Option<PortRange>,
}

impl FlowDescriptorBuilder {
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Set the protocol from its textual or numeric form.
    pub fn protocol_str(mut self, protocol: &str) -> Result<Self> {
        self.protocol = Some(parse_protocol(protocol)?);
        Ok(self)
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Address the destination through its public address.
    pub fn using_public_address(mut self) -> Self {
        self.use_public_address = true;
        self
    }

    /// Address the destination through the given private address.
    pub fn destination_private_address(mut self, address: IpAddr) -> Self {
        self.private_address = Some(address);
        self
    }

    pub fn ephemeral_range(mut self, range: PortRange) -> Self {
        self.ephemeral_range = Some(range);
        self
    }

    /// Set the ephemeral range from a `from,to` specification.
    pub fn ephemeral_range_str(mut self, spec: &str) -> Result<Self> {
        self.ephemeral_range = Some(parse_port_range(spec)?);
        Ok(self)
    }

    pub fn build(self) -> Result<FlowDescriptor> {
        let mode = match (self.use_public_address, self.private_address) {
            (true, Some(_)) => {
                return Err(ReachError::AmbiguousInput(
                    "both public and private addressing requested".to_string(),
                ))
            }
            (false, None) => {
                return Err(ReachError::AmbiguousInput(
                    "an addressing mode (public or private address) is required".to_string(),
                ))
            }
            (true, None) => AddressingMode::PublicAddress,
            (false, Some(address)) => AddressingMode::PrivateAddress(address),
        };

        let protocol = self
            .protocol
            .ok_or_else(|| ReachError::AmbiguousInput("protocol is required".to_string()))?;
        let port = self
            .port
            .ok_or_else(|| ReachError::AmbiguousInput("destination port is required".to_string()))?;

        let ephemeral_range = self.ephemeral_range.map(ordered).transpose()?;

        Ok(FlowDescriptor {
            protocol,
            port,
            mode,
            ephemeral_range,
        })
    }
}
