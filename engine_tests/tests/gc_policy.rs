//! Garbage collector policy under controlled time and memory pressure.

use std::time::Duration;

use engine_resources::prelude::*;
use engine_tests::Fixture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 25 very old resources under pressure: exactly the 10 least recently used
/// go, oldest first.
#[test]
fn alert_pass_unloads_the_ten_oldest() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let handles = (0..25)
        .map(|i| fx.recorder(&format!("r{i}"), ""))
        .collect::<Result<Vec<_>, _>>()?;

    // Use in reverse creation order, so age and creation order disagree.
    for &h in handles.iter().rev() {
        fx.advance_secs(1);
        fx.registry.load(h)?;
    }

    fx.advance_secs(60);
    fx.raise_pressure();
    let pass = fx.registry.on_frame().expect("alert pass due");

    assert_eq!(pass.regime, GcRegime::Alert);
    let expected: Vec<ResourceHandle> = handles[15..].iter().rev().copied().collect();
    assert_eq!(pass.unloaded, expected);
    assert_eq!(fx.registry.stats().loaded_count, 15);
    for &h in &handles[..15] {
        assert_eq!(fx.registry.state(h), Some(ResourceState::Loaded));
    }
    Ok(())
}

#[test]
fn alert_cap_comes_from_config() -> anyhow::Result<()> {
    let mut fx = Fixture::with_config(GcConfig {
        alert_max_unloads: 3,
        ..GcConfig::default()
    });
    for i in 0..8 {
        let h = fx.recorder(&format!("r{i}"), "")?;
        fx.registry.load(h)?;
    }
    fx.advance_secs(10);

    let pass = fx.registry.collect_now(GcRegime::Alert);
    assert_eq!(pass.unloaded.len(), 3);
    // Same last use: creation order decides.
    let names: Vec<&str> = pass
        .unloaded
        .iter()
        .filter_map(|&h| fx.registry.meta(h).map(|m| m.name()))
        .collect();
    assert_eq!(names, ["r0", "r1", "r2"]);
    Ok(())
}

#[test]
fn unavailable_signals_never_alert() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let h = fx.recorder("a", "")?;
    fx.registry.load(h)?;

    // Both signals unavailable; only the normal interval can trigger a pass.
    for _ in 0..15 {
        fx.advance_secs(4);
        assert!(fx.registry.on_frame().is_none());
    }
    fx.advance_secs(4);
    let pass = fx.registry.on_frame().expect("normal pass due");
    assert_eq!(pass.regime, GcRegime::Normal);
    // Only 64s idle: below the normal age.
    assert!(pass.unloaded.is_empty());
    Ok(())
}

#[test]
fn low_graphics_memory_alone_triggers_alert() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let h = fx.recorder("a", "")?;
    fx.registry.load(h)?;
    fx.memory.set_graphics_free(Some(1));

    fx.advance_secs(4);
    let pass = fx.registry.on_frame().expect("alert pass due");
    assert_eq!(pass.regime, GcRegime::Alert);
    assert_eq!(pass.unloaded, vec![h]);
    Ok(())
}

/// Intervals beyond what a `Duration` holds disable the timer instead of
/// overflowing it.
#[test]
fn oversized_intervals_saturate() -> anyhow::Result<()> {
    let mut fx = Fixture::with_config(GcConfig::from_json_str(
        r#"{ "check_interval_secs": 1e20 }"#,
    )?);
    let h = fx.recorder("a", "")?;
    fx.registry.load(h)?;
    fx.raise_pressure();

    fx.advance_secs(5);
    assert!(fx.registry.on_frame().is_none());
    fx.clock.advance(Duration::MAX);
    assert!(fx.registry.on_frame().is_none());

    // Explicit passes still work.
    let pass = fx.registry.collect_now(GcRegime::Alert);
    assert_eq!(pass.unloaded, vec![h]);
    Ok(())
}

#[test]
fn checks_are_rate_limited() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    fx.raise_pressure();

    fx.advance_secs(4);
    assert!(fx.registry.on_frame().is_some());
    // Same instant and within the check interval: no pass.
    assert!(fx.registry.on_frame().is_none());
    fx.clock.advance(Duration::from_millis(2_500));
    assert!(fx.registry.on_frame().is_none());
    fx.clock.advance(Duration::from_millis(1_000));
    assert!(fx.registry.on_frame().is_some());
    Ok(())
}

#[test]
fn recently_used_resources_survive_normal_pass() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let old = fx.recorder("old", "")?;
    let fresh = fx.recorder("fresh", "")?;
    fx.registry.load(old)?;
    fx.registry.load(fresh)?;

    fx.advance_secs(100);
    fx.registry.load(fresh)?;
    fx.advance_secs(30);

    let pass = fx.registry.on_frame().expect("normal pass due");
    assert_eq!(pass.unloaded, vec![old]);
    assert_eq!(fx.registry.state(fresh), Some(ResourceState::Loaded));
    Ok(())
}

/// Random operation sequences: locked resources never appear in a pass, and
/// the loaded/locked sets always match resource states.
#[test]
fn locked_resources_never_collected() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut fx = Fixture::new();
    let handles = (0..12)
        .map(|i| fx.recorder(&format!("r{i}"), ""))
        .collect::<Result<Vec<_>, _>>()?;

    for _ in 0..2_000 {
        let h = handles[rng.gen_range(0..handles.len())];
        match rng.gen_range(0..5) {
            0 | 1 => fx.registry.load(h)?,
            2 => fx.registry.lock(h)?,
            3 => fx.registry.unlock(h)?,
            _ => fx.registry.unload(h)?,
        }
        fx.advance_secs(rng.gen_range(0..6));
        if rng.gen_bool(0.2) {
            fx.memory.set_physical_load(Some(rng.gen_range(50..100)));
        }

        if let Some(pass) = fx.registry.on_frame() {
            for victim in &pass.unloaded {
                let meta = fx.registry.meta(*victim).expect("victim still registered");
                assert_eq!(meta.lock_count(), 0);
                assert_eq!(meta.state(), ResourceState::Unloaded);
            }
            if pass.regime == GcRegime::Alert {
                assert!(pass.unloaded.len() <= 10);
            }
        }

        let loaded: Vec<_> = fx.registry.loaded().collect();
        let locked: Vec<_> = fx.registry.locked().collect();
        for &h in &handles {
            let state = fx.registry.state(h).expect("handle live");
            assert_eq!(loaded.contains(&h), state == ResourceState::Loaded);
            assert_eq!(locked.contains(&h), state == ResourceState::Locked);
        }
    }
    Ok(())
}
