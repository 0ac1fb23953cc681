//! vmexit ベンチマーク
//!
//! 4 種類の復帰経路それぞれについて、何もしないハイパーコールを
//! 指定回数発行し、1 回あたりのコストを TSC で測定します。
//! Akaros バックエンドが選択されている場合のみ実行できます。

use core::fmt;

use raw_cpuid::CpuIdReader;

use crate::arch::x86_64::{ExitProbe, Hypercall, WaitPrimitive, read_timestamp_ordered};
use crate::errors::{BenchError, Result};
use crate::kernel::paravirt::Paravirt;

/// 単調増加するサイクルカウンタ
pub trait Clock {
    /// 現在のカウント
    fn now(&self) -> u64;
}

/// TSC (Time Stamp Counter)
#[derive(Debug, Clone, Copy, Default)]
pub struct TscClock;

impl Clock for TscClock {
    #[inline(always)]
    fn now(&self) -> u64 {
        read_timestamp_ordered()
    }
}

/// ベンチマーク結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkResult {
    /// ベンチマーク名
    pub name: &'static str,
    /// 実行に要したサイクル数
    pub cycles: u64,
    /// 実行回数
    pub iterations: u64,
}

impl BenchmarkResult {
    /// 1 回あたりの平均サイクル数（0 回なら 0）
    #[inline]
    pub fn avg_cycles(&self) -> u64 {
        self.cycles.checked_div(self.iterations).unwrap_or(0)
    }

    /// 1 回あたりのナノ秒（`tsc_khz` か回数が 0 なら 0）
    pub fn nanos_per_iter(&self, tsc_khz: u64) -> u64 {
        let denom = u128::from(tsc_khz) * u128::from(self.iterations);
        if denom == 0 {
            return 0;
        }
        let nanos = u128::from(self.cycles) * 1_000_000 / denom;
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} cycles (avg: {} cycles over {} iterations)",
            self.name,
            self.cycles,
            self.avg_cycles(),
            self.iterations
        )
    }
}

/// `f` を `iterations` 回実行して測定
///
/// 0 回の場合はクロックを読まず、経過サイクルも 0 とします。
#[inline(never)]
pub fn benchmark_avg<C, F>(clock: &C, name: &'static str, iterations: u64, mut f: F) -> BenchmarkResult
where
    C: Clock,
    F: FnMut(),
{
    if iterations == 0 {
        return BenchmarkResult {
            name,
            cycles: 0,
            iterations,
        };
    }

    let start = clock.now();
    for _ in 0..iterations {
        f();
    }
    let end = clock.now();

    BenchmarkResult {
        name,
        cycles: end.saturating_sub(start),
        iterations,
    }
}

/// vmexit ベンチマーク
pub struct VmexitBench<'a, 'h, R: CpuIdReader, H: Hypercall, W: WaitPrimitive, C: Clock> {
    paravirt: &'a Paravirt<'h, R, H, W>,
    clock: &'a C,
    iterations: u64,
    tsc_khz: u64,
}

impl<'a, 'h, R, H, W, C> VmexitBench<'a, 'h, R, H, W, C>
where
    R: CpuIdReader,
    H: Hypercall,
    W: WaitPrimitive,
    C: Clock,
{
    /// ベンチマークを作成
    ///
    /// `tsc_khz` は ns 換算に使う TSC 周波数。
    pub const fn new(
        paravirt: &'a Paravirt<'h, R, H, W>,
        clock: &'a C,
        iterations: u64,
        tsc_khz: u64,
    ) -> Self {
        Self {
            paravirt,
            clock,
            iterations,
            tsc_khz,
        }
    }

    /// 4 種類の復帰経路を順に測定
    ///
    /// # Errors
    ///
    /// Akaros バックエンドがバインドされていない場合（ベアメタル、`nopv`、
    /// `init_platform` 前）は `BenchError::NotAkaros` を返し、何も測定しません。
    pub fn run(&self) -> Result<[BenchmarkResult; 4]> {
        if !self.paravirt.is_top() {
            log::error!("vmexit_speed: {}", BenchError::NotAkaros);
            return Err(BenchError::NotAkaros.into());
        }

        log::info!("vmexit_speed: running {} loops of vmcalls", self.iterations);

        let results = ExitProbe::ALL.map(|probe| {
            benchmark_avg(self.clock, probe.label(), self.iterations, || {
                self.paravirt.host().exit_probe(probe);
            })
        });

        for result in &results {
            log::info!(
                "vmexit_speed: {}: {} ticks/iter, {} nsec/iter",
                result.name,
                result.avg_cycles(),
                result.nanos_per_iter(self.tsc_khz)
            );
        }

        Ok(results)
    }
}

impl<R, H, W, C> fmt::Debug for VmexitBench<'_, '_, R, H, W, C>
where
    R: CpuIdReader,
    H: Hypercall,
    W: WaitPrimitive,
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmexitBench")
            .field("iterations", &self.iterations)
            .field("tsc_khz", &self.tsc_khz)
            .finish_non_exhaustive()
    }
}
