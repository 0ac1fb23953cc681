//! Akaros ゲストのデモカーネル
//!
//! 起動時に Akaros を検出し、プラットフォーム操作を選択してから
//! アイドルループに入ります。

#![no_std]
#![no_main]
#![deny(unsafe_op_in_unsafe_fn)]

use core::panic::PanicInfo;

use akaros_guest::arch::x86_64::{NativeMwait, PROBE, VMCALL, Vmcall};
use akaros_guest::kernel::driver::{
    FIRST_PANIC, NORMAL, SERIAL1, enter_panic, set_hypercall_console, set_serial_console,
};
use akaros_guest::kernel::logger;
use akaros_guest::{GuestConfig, Paravirt, debug_println, hlt_loop, println};
use bootloader_api::{BootInfo, BootloaderConfig, entry_point};
use raw_cpuid::CpuIdReaderNative;
use spin::Once;

/// Bootloader configuration.
pub static BOOTLOADER_CONFIG: BootloaderConfig = BootloaderConfig::new_default();

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

/// ビルド時に埋め込むカーネルコマンドライン
const CMDLINE: &str = match option_env!("AKAROS_GUEST_CMDLINE") {
    Some(cmdline) => cmdline,
    None => "",
};

type GuestParavirt = Paravirt<'static, CpuIdReaderNative, Vmcall, NativeMwait>;

static MWAIT: NativeMwait = NativeMwait;
static PARAVIRT: Once<GuestParavirt> = Once::new();

fn kernel_main(_boot_info: &'static mut BootInfo) -> ! {
    SERIAL1.lock().init();

    let config = GuestConfig::parse(CMDLINE).unwrap_or_else(|err| {
        debug_println!("[KERNEL] ignoring command line: {}", err);
        GuestConfig::default()
    });
    if let Err(err) = logger::init(config.log_level) {
        debug_println!("[KERNEL] logger: {}", err);
    }

    let pv = PARAVIRT.call_once(|| Paravirt::new(&PROBE, &VMCALL, &MWAIT, config));
    let detection = pv.detect();

    let console = if detection.is_present() {
        set_hypercall_console(detection)
    } else {
        set_serial_console()
    };
    if let Err(err) = console {
        log::warn!("console: {}", err);
    }

    let ops = match pv.init_platform() {
        Ok(ops) => ops,
        Err(err) => panic!("platform init failed: {}", err),
    };
    println!("akaros_guest: platform ops = {}", ops.name());
    log::info!(
        "tsc {:?} kHz, cpu {:?} kHz, lapic period {:?}, x2apic {}",
        ops.calibrate_tsc(),
        ops.calibrate_cpu(),
        ops.apic_post_init(),
        ops.x2apic_available()
    );
    log::debug!("slots {:?}, legacy {:?}", ops.overrides(), ops.legacy_devices());

    #[cfg(feature = "vmexit_bench")]
    run_vmexit_bench(pv, &config, ops.calibrate_tsc().unwrap_or(0));

    loop {
        ops.safe_halt();
    }
}

#[cfg(feature = "vmexit_bench")]
fn run_vmexit_bench(pv: &GuestParavirt, config: &GuestConfig, tsc_khz: u64) {
    use akaros_guest::kernel::bench::{TscClock, VmexitBench};

    let bench = VmexitBench::new(pv, &TscClock, config.bench_iterations, tsc_khz);
    if let Err(err) = bench.run() {
        log::error!("{}", err);
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let level = enter_panic();
    if level == NORMAL || level == FIRST_PANIC {
        debug_println!("[PANIC] {}", info);
    }
    if level == NORMAL
        && let Some(pv) = PARAVIRT.get()
    {
        pv.trace_trapframe();
    }
    hlt_loop()
}
