/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Board support: register access and the BCM2837 peripherals the emulation layer drives.

mod mmio_deref_wrapper;
pub mod rpi3;

pub use {mmio_deref_wrapper::MMIODerefWrapper, rpi3::BcmHost};
