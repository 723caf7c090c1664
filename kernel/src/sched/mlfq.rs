//! 4.4BSD-style MLFQ formulas (spec §4.3 "MLFQ mode").

use alloc::sync::Arc;

use crate::fixed_point::{self, Fixed};

use super::thread::{Priority, Thread, PRI_MAX, PRI_MIN};

/// Ticks per second; the cadence at which `load_avg` and every thread's
/// `recent_cpu` are recomputed.
pub const TIMER_FREQ: u32 = 100;

/// `priority = PRI_MAX − nearest_int(recent_cpu / 4) − nice · 2`, clamped.
pub fn recompute_priority(thread: &Arc<Thread>) {
    let recent_cpu_term = fixed_point::to_int_round(fixed_point::div_int(thread.recent_cpu(), 4));
    let nice_term = i32::from(thread.nice()) * 2;
    let raw = i32::from(PRI_MAX) - recent_cpu_term - nice_term;
    let clamped = raw.clamp(i32::from(PRI_MIN), i32::from(PRI_MAX)) as Priority;
    thread.set_base_priority(clamped);
}

/// `load_avg = (59/60) * load_avg + (1/60) * ready_threads`.
pub fn next_load_avg(load_avg: Fixed, ready_threads: i32) -> Fixed {
    let fifty_nine_sixtieths = fixed_point::div(fixed_point::from_int(59), fixed_point::from_int(60));
    let one_sixtieth = fixed_point::div(fixed_point::from_int(1), fixed_point::from_int(60));
    fixed_point::add(
        fixed_point::mul(fifty_nine_sixtieths, load_avg),
        fixed_point::mul_int(one_sixtieth, ready_threads),
    )
}

/// `recent_cpu = (2*load_avg / (2*load_avg + 1)) * recent_cpu + nice`.
pub fn recompute_recent_cpu(thread: &Arc<Thread>, load_avg: Fixed) {
    let two_load_avg = fixed_point::mul_int(load_avg, 2);
    let coefficient = fixed_point::div(two_load_avg, fixed_point::add_int(two_load_avg, 1));
    let next = fixed_point::add_int(
        fixed_point::mul(coefficient, thread.recent_cpu()),
        i32::from(thread.nice()),
    );
    thread.set_recent_cpu(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[test]
    fn priority_formula_matches_example() {
        let t = Thread::new(1, String::from("t"), 0);
        t.set_nice(0);
        t.set_recent_cpu(0);
        recompute_priority(&t);
        assert_eq!(t.base_priority(), 63);

        let t2 = Thread::new(2, String::from("t2"), 0);
        t2.set_nice(5);
        t2.set_recent_cpu(fixed_point::from_int(20));
        recompute_priority(&t2);
        // 63 - round(20/4) - 5*2 = 63 - 5 - 10 = 48
        assert_eq!(t2.base_priority(), 48);
    }

    #[test]
    fn priority_clamps_to_valid_range() {
        let t = Thread::new(1, String::from("t"), 0);
        t.set_nice(20);
        t.set_recent_cpu(fixed_point::from_int(1000));
        recompute_priority(&t);
        assert_eq!(t.base_priority(), PRI_MIN);
    }

    #[test]
    fn load_avg_decays_toward_ready_count() {
        let mut load_avg = 0;
        for _ in 0..1000 {
            load_avg = next_load_avg(load_avg, 1);
        }
        // Should converge close to fixed-point 1.0.
        let one = fixed_point::from_int(1);
        assert!((load_avg - one).abs() < fixed_point::from_int(1) / 100);
    }
}
