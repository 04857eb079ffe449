//! Small kernel routines with no better home.

use std::fs::File;
use std::io::{self, Read};

const RANDOM_DEVICE: &str = "/dev/random";
const URANDOM_DEVICE: &str = "/dev/urandom";

/// Position of the highest set bit counting from 1, or 0 for 0.
pub fn highbit(value: u64) -> u32 {
    u64::BITS - value.leading_zeros()
}

/// Fills `buf` with bytes from the blocking random device.
pub fn random_get_bytes(buf: &mut [u8]) -> io::Result<()> {
    fill_from(RANDOM_DEVICE, buf)
}

/// Fills `buf` with bytes from the non-blocking random device.
pub fn random_get_pseudo_bytes(buf: &mut [u8]) -> io::Result<()> {
    fill_from(URANDOM_DEVICE, buf)
}

fn fill_from(device: &str, buf: &mut [u8]) -> io::Result<()> {
    File::open(device)?.read_exact(buf)
}
