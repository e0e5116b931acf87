//! # PCSync Firmware
//!
//! Runs the bounded-buffer engine on an STM32F4 Discovery board:
//!
//! | Task | Priority | Count | Behavior |
//! |------|----------|-------|----------|
//! | `idle_task` (kernel) | 0 | 1 | `wfi` forever |
//! | `service_task` | 15 | 1 | Waits on the doorbell, blinks the requested LED |
//! | `producer_task` | 1 | `PRODUCER_COUNT` | Inserts random items, requests green bursts |
//! | `consumer_task` | 1 | `CONSUMER_COUNT` | Removes items, requests red bursts |
//!
//! ## Expected Behavior
//!
//! Producers and consumers are round-robined by the 500 µs time-sharing
//! clock. Every successful buffer operation rings the doorbell; the
//! service task preempts the workers and blinks the green (producer) or
//! red (consumer) LED `item` times, half a second per toggle. Requests
//! published during a burst overwrite each other, so only the latest is
//! shown next. Diagnostics stream out over ITM port 0.

#![no_std]
#![no_main]

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use cortex_m::peripheral::SYST;
use cortex_m_rt::entry;
use panic_halt as _;

use pcsync::board::{self, LedActuator};
use pcsync::config::{
    ACTUATION_DELAY_CYCLES, BUFFER_SIZE, CONSUMER_COUNT, PRODUCER_COUNT, SERVICE_PRIORITY,
    WORKER_PRIORITY,
};
use pcsync::delay::CycleDelay;
use pcsync::diag::{ItmLogger, LogSink};
use pcsync::driver::{Consumer, Producer, RandomItems, Shared};
use pcsync::kernel::{self, KernelSemaphore};
use pcsync::service::ServiceUnit;

type Engine = Shared<KernelSemaphore, LogSink, BUFFER_SIZE>;

static LOGGER: ItmLogger = ItmLogger::new();

/// The engine every task works against. Published by `main` before the
/// kernel starts.
static ENGINE: AtomicPtr<Engine> = AtomicPtr::new(ptr::null_mut());

fn engine() -> &'static Engine {
    // Safety: set from a `'static` singleton before any task runs, never
    // cleared.
    unsafe { &*ENGINE.load(Ordering::Acquire) }
}

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// **Service Task** (Priority 15)
///
/// Sole reader of the mailbox. Its delay burns cycles so a burst is never
/// interleaved with worker activity.
extern "C" fn service_task(_arg: usize) -> ! {
    let Some(receiver) = engine().mailbox.receiver() else {
        log::error!("service: mailbox receiver already claimed");
        loop {
            cortex_m::asm::wfi();
        }
    };
    ServiceUnit::new(
        receiver,
        LedActuator::new(),
        CycleDelay::new(ACTUATION_DELAY_CYCLES),
    )
    .run()
}

/// **Producer Task** (Priority 1)
///
/// `arg` is the producer id. The SysTick counter adds some entropy to the
/// item stream.
extern "C" fn producer_task(arg: usize) -> ! {
    let seed = ((arg as u64) << 32) | SYST::get_current() as u64;
    Producer::new(arg as u32, engine(), RandomItems::new(seed)).run()
}

/// **Consumer Task** (Priority 1)
///
/// `arg` is the consumer id.
extern "C" fn consumer_task(arg: usize) -> ! {
    Consumer::new(arg as u32, engine()).run()
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Builds the engine, creates tasks and starts the
/// scheduler. Does not return.
#[entry]
fn main() -> ! {
    // Take ownership of core peripherals
    let cp = cortex_m::Peripherals::take().unwrap();

    LOGGER.attach(cp.ITM, log::LevelFilter::Info);
    board::init_leds();

    let engine: &'static mut Engine = cortex_m::singleton!(: Engine = Shared::new(LogSink))
        .expect("engine already built");
    ENGINE.store(engine, Ordering::Release);

    // Initialize the kernel (creates the idle task)
    kernel::init().expect("Failed to initialize kernel");

    // --- Create tasks ---

    kernel::create_task(service_task, SERVICE_PRIORITY, 0)
        .expect("Failed to create service_task");

    for id in 1..=PRODUCER_COUNT {
        kernel::create_task(producer_task, WORKER_PRIORITY, id)
            .expect("Failed to create producer_task");
    }

    for id in 1..=CONSUMER_COUNT {
        kernel::create_task(consumer_task, WORKER_PRIORITY, id)
            .expect("Failed to create consumer_task");
    }

    log::info!(
        "pcsync: {} producers, {} consumers, {} slots",
        PRODUCER_COUNT,
        CONSUMER_COUNT,
        BUFFER_SIZE
    );

    // Start the scheduler — does not return
    kernel::start(cp.SYST)
}
