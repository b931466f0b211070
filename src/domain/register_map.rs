// Register layout of the line controllers and the block decoder
use super::machine::{round2, RunState, Standards, CHANNELS, LOT_ENDED};

/// First holding register of the telemetry block.
pub const BASE_ADDRESS: u16 = 2000;

/// Registers read per poll: 2000..=2040.
pub const BLOCK_LEN: usize = 41;

const STD_VOLTAGE: usize = 0;
const STD_AMPERAGE: usize = 1;
const LOT_START: usize = 2;
const LOT_END: usize = 17;
const VOLTAGE_START: usize = 20;
const AMPERAGE_START: usize = 26;
const LOT_STATUS: usize = 40;

const SCALE: f64 = 100.0;

/// A complete register block. Can only be built from exactly [`BLOCK_LEN`] registers,
/// which is what makes [`decode`] total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBlock([u16; BLOCK_LEN]);

impl RegisterBlock {
    #[cfg(test)]
    pub fn new(registers: [u16; BLOCK_LEN]) -> Self {
        Self(registers)
    }

    pub fn registers(&self) -> &[u16; BLOCK_LEN] {
        &self.0
    }
}

impl TryFrom<Vec<u16>> for RegisterBlock {
    /// The number of registers actually received.
    type Error = usize;

    fn try_from(registers: Vec<u16>) -> Result<Self, Self::Error> {
        let len = registers.len();
        <[u16; BLOCK_LEN]>::try_from(registers)
            .map(Self)
            .map_err(|_| len)
    }
}

/// Everything the block carries. Averages are derived later by `MachineReading::new`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBlock {
    pub run_state: RunState,
    pub lot_identifier: String,
    pub standards: Standards,
    pub channel_voltages: [f64; CHANNELS],
    pub channel_amperages: [f64; CHANNELS],
}

pub fn decode(block: &RegisterBlock) -> DecodedBlock {
    let regs = block.registers();

    let lot_status = regs[LOT_STATUS];
    let run_state = if lot_status == 1 {
        RunState::Running
    } else {
        RunState::Stopped
    };

    let lot_identifier = if lot_status == 0 {
        LOT_ENDED.to_string()
    } else {
        decode_lot(&regs[LOT_START..LOT_END])
    };

    DecodedBlock {
        run_state,
        lot_identifier,
        standards: Standards {
            voltage: fixed_point(regs[STD_VOLTAGE]),
            amperage: fixed_point(regs[STD_AMPERAGE]),
        },
        channel_voltages: channels(regs, VOLTAGE_START),
        channel_amperages: channels(regs, AMPERAGE_START),
    }
}

fn fixed_point(raw: u16) -> f64 {
    round2(f64::from(raw) / SCALE)
}

fn channels(regs: &[u16; BLOCK_LEN], start: usize) -> [f64; CHANNELS] {
    std::array::from_fn(|i| fixed_point(regs[start + i]))
}

/// One character per register: 1..=9 are digits, other codes are code points, 0 is padding.
fn decode_lot(codes: &[u16]) -> String {
    let lot: String = codes
        .iter()
        .filter_map(|&code| match code {
            0 => None,
            1..=9 => char::from_digit(u32::from(code), 10),
            _ => char::from_u32(u32::from(code)),
        })
        .collect();
    lot.trim().to_string()
}

/// Inverse of [`decode`], used by device fixtures in tests.
#[cfg(test)]
pub(crate) fn encode(decoded: &DecodedBlock, lot_status: u16) -> RegisterBlock {
    let to_raw = |v: f64| (v * SCALE).round() as u16;
    let mut regs = [0u16; BLOCK_LEN];
    regs[STD_VOLTAGE] = to_raw(decoded.standards.voltage);
    regs[STD_AMPERAGE] = to_raw(decoded.standards.amperage);
    for (slot, ch) in regs[LOT_START..LOT_END]
        .iter_mut()
        .zip(decoded.lot_identifier.chars())
    {
        *slot = ch as u16;
    }
    for i in 0..CHANNELS {
        regs[VOLTAGE_START + i] = to_raw(decoded.channel_voltages[i]);
        regs[AMPERAGE_START + i] = to_raw(decoded.channel_amperages[i]);
    }
    regs[LOT_STATUS] = lot_status;
    RegisterBlock::new(regs)
}

#[cfg(test)]
pub(crate) fn lot_block(lot_status: u16) -> RegisterBlock {
    let mut regs = [0u16; BLOCK_LEN];
    regs[0] = 1200;
    regs[1] = 500;
    regs[2] = 'L' as u16;
    regs[3] = 'O' as u16;
    regs[4] = 'T' as u16;
    regs[20..26].copy_from_slice(&[1000, 1500, 1100, 1200, 1300, 1400]);
    regs[26..32].copy_from_slice(&[500, 510, 505, 495, 505, 500]);
    regs[40] = lot_status;
    RegisterBlock::new(regs)
}
