// Modbus/TCP register source
use crate::application::register_source::{AcquisitionError, RegisterSource};
use crate::domain::register_map::{RegisterBlock, BASE_ADDRESS, BLOCK_LEN};
use async_trait::async_trait;
use std::time::Duration;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;

/// One Modbus/TCP session to a line controller, reading holding registers
/// 2000..=2040 from a fixed unit id.
pub struct ModbusRegisterSource {
    host: String,
    port: u16,
    unit_id: u8,
    io_timeout: Duration,
    ctx: Option<Context>,
}

impl ModbusRegisterSource {
    pub fn new(host: String, port: u16, unit_id: u8, io_timeout: Duration) -> Self {
        Self {
            host,
            port,
            unit_id,
            io_timeout,
            ctx: None,
        }
    }

    fn connect_error(&self, reason: impl ToString) -> AcquisitionError {
        AcquisitionError::Connect {
            endpoint: self.endpoint(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl RegisterSource for ModbusRegisterSource {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&mut self) -> Result<(), AcquisitionError> {
        self.ctx = None;

        let socket_addr = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| self.connect_error(e))?
            .next()
            .ok_or_else(|| self.connect_error("address did not resolve"))?;

        let ctx = tokio::time::timeout(self.io_timeout, tcp::connect_slave(socket_addr, Slave(self.unit_id)))
            .await
            .map_err(|_| self.connect_error(format!("no answer within {:?}", self.io_timeout)))?
            .map_err(|e| self.connect_error(e))?;

        self.ctx = Some(ctx);
        Ok(())
    }

    async fn read_block(&mut self) -> Result<RegisterBlock, AcquisitionError> {
        let io_timeout = self.io_timeout;
        let ctx = self.ctx.as_mut().ok_or(AcquisitionError::NotConnected)?;

        let registers = tokio::time::timeout(
            io_timeout,
            ctx.read_holding_registers(BASE_ADDRESS, BLOCK_LEN as u16),
        )
        .await
        .map_err(|_| AcquisitionError::Timeout(io_timeout))?
        .map_err(|e| AcquisitionError::Transport(e.to_string()))?
        .map_err(|code| AcquisitionError::Exception(format!("{code:?}")))?;

        RegisterBlock::try_from(registers).map_err(AcquisitionError::ShortBlock)
    }

    async fn disconnect(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.disconnect().await {
                tracing::debug!("Closing {} failed: {}", self.endpoint(), e);
            }
        }
    }
}
