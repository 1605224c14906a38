//! Ports layer: the machine SPI the advancer drives.

pub mod outbound;
