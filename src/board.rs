//! # Board Support (STM32F4 Discovery)
//!
//! The two status LEDs on GPIO port D are the actuators:
//!
//! | Channel | Pin  | LED   | Driven by |
//! |---------|------|-------|-----------|
//! | A       | PD12 | green | producers |
//! | B       | PD14 | red   | consumers |
//!
//! Registers are accessed directly, like the core registers in the arch
//! layer; no PAC is pulled in for two pins.

use core::ptr::{read_volatile, write_volatile};

use crate::mailbox::Channel;
use crate::service::Actuator;

/// RCC AHB1 peripheral clock enable register.
const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;
const RCC_AHB1ENR_GPIODEN: u32 = 1 << 3;

const GPIOD_BASE: usize = 0x4002_0C00;
const GPIOD_MODER: *mut u32 = GPIOD_BASE as *mut u32;
const GPIOD_ODR: *const u32 = (GPIOD_BASE + 0x14) as *const u32;
const GPIOD_BSRR: *mut u32 = (GPIOD_BASE + 0x18) as *mut u32;

const GREEN_PIN: u32 = 12;
const RED_PIN: u32 = 14;

#[inline]
fn pin(channel: Channel) -> u32 {
    match channel {
        Channel::A => GREEN_PIN,
        Channel::B => RED_PIN,
    }
}

/// Enable the port D clock and drive both LED pins low as push-pull
/// outputs. Call once before the kernel starts.
pub fn init_leds() {
    unsafe {
        let enr = read_volatile(RCC_AHB1ENR);
        write_volatile(RCC_AHB1ENR, enr | RCC_AHB1ENR_GPIODEN);
        // Read back so the clock is running before the port is touched
        let _ = read_volatile(RCC_AHB1ENR);

        let mut moder = read_volatile(GPIOD_MODER);
        for pin in [GREEN_PIN, RED_PIN] {
            moder &= !(0b11 << (pin * 2));
            moder |= 0b01 << (pin * 2);
        }
        write_volatile(GPIOD_MODER, moder);

        // BSRR upper half resets
        write_volatile(GPIOD_BSRR, (1 << (GREEN_PIN + 16)) | (1 << (RED_PIN + 16)));
    }
}

/// The Discovery board LEDs. Zero-sized: the state lives in the GPIO
/// registers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LedActuator;

impl LedActuator {
    pub const fn new() -> Self {
        Self
    }

    /// Current level of the channel's LED.
    pub fn is_on(&self, channel: Channel) -> bool {
        unsafe { read_volatile(GPIOD_ODR) & (1 << pin(channel)) != 0 }
    }
}

impl Actuator for LedActuator {
    fn toggle(&mut self, channel: Channel) {
        let pin = pin(channel);
        // BSRR writes are atomic, no read-modify-write of ODR
        let bits = if self.is_on(channel) {
            1 << (pin + 16)
        } else {
            1 << pin
        };
        unsafe { write_volatile(GPIOD_BSRR, bits) };
    }
}
