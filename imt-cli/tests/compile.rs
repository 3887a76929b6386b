use std::sync::mpsc::channel;

use imt_cli::{
    compile, CompileError, CompiledBundle, Compiler, CompilerBuilder, CompilerConfig, FormatError, GrayImage,
    Polarity, ProgressError, ProgressEvent, ProgressResult, RasterImage, FORMAT_VERSION,
};

/// Scattered rectangles of random size and contrast, reproducible per seed
fn scene(width: usize, height: usize, seed: u32) -> GrayImage {
    let mut state = seed.wrapping_mul(2_654_435_761) | 1;
    let mut next = |bound: usize| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state as usize % bound
    };

    let mut img = GrayImage::filled(width, height, 100);
    let count = width * height / 600;
    for _ in 0..count {
        let w = 4 + next(14);
        let h = 4 + next(14);
        let x0 = next(width - w);
        let y0 = next(height - h);
        let v = (if next(2) == 0 { 10 + next(40) } else { 180 + next(75) }) as u8;
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                img.data[y * width + x] = v;
            }
        }
    }
    img
}

fn config() -> CompilerConfig {
    CompilerBuilder::new().threads(2).to_config()
}

#[test]
fn test_compile_is_deterministic() {
    let img = scene(240, 180, 1);
    let a = compile(&[img.view()], &config(), None).unwrap();
    let b = compile(&[img.view()], &config(), None).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_bytes(), b.to_bytes());
}

#[test]
fn test_thread_count_does_not_change_output() {
    let img = scene(300, 220, 2);
    let one = compile(&[img.view()], &CompilerBuilder::new().threads(1).to_config(), None).unwrap();
    let four = compile(&[img.view()], &CompilerBuilder::new().threads(4).to_config(), None).unwrap();
    assert_eq!(one.to_bytes(), four.to_bytes());
}

#[test]
fn test_targets_follow_input_order() {
    let images = [scene(200, 160, 3), scene(260, 140, 4), scene(180, 180, 5)];
    let views: Vec<RasterImage<'_>> = images.iter().map(GrayImage::view).collect();
    let bundle = compile(&views, &config(), None).unwrap();
    assert_eq!(bundle.len(), 3);
    for (target, img) in bundle.targets.iter().zip(&images) {
        assert_eq!(target.width as usize, img.width);
        assert_eq!(target.height as usize, img.height);
        assert!(target.keypoint_count() > 0);
    }
}

#[test]
fn test_swapped_batch_matches_single_compiles() {
    let a = scene(220, 170, 6);
    let b = scene(190, 210, 7);
    let cfg = config();

    let ab = compile(&[a.view(), b.view()], &cfg, None).unwrap();
    assert_eq!(ab.len(), 2);

    let ba = compile(&[b.view(), a.view()], &cfg, None).unwrap();
    let only_a = compile(&[a.view()], &cfg, None).unwrap();
    let only_b = compile(&[b.view()], &cfg, None).unwrap();
    assert_eq!(ba.targets[0], only_b.targets[0]);
    assert_eq!(ba.targets[1], only_a.targets[0]);
    assert_eq!(ab.targets[0], ba.targets[1]);
}

#[test]
fn test_progress_is_monotonic_and_complete() {
    let images = [scene(200, 150, 8), scene(256, 256, 9)];
    let views: Vec<_> = images.iter().map(GrayImage::view).collect();

    let mut seen = Vec::new();
    let mut record = |p: f64| -> ProgressResult {
        seen.push(p);
        Ok(())
    };
    let bundle = compile(&views, &config(), Some(&mut record)).unwrap();

    let units: usize = bundle.targets.iter().map(|t| t.levels.len() + 1).sum();
    assert_eq!(seen.len(), units + 1);
    assert_eq!(seen.first(), Some(&0.0));
    assert_eq!(seen.last(), Some(&100.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
    assert_eq!(seen.iter().filter(|&&p| p == 100.0).count(), 1);
}

#[test]
fn test_progress_over_channel() {
    let img = scene(200, 200, 10);
    let (mut tx, rx) = channel::<ProgressEvent>();
    compile(&[img.view()], &config(), Some(&mut tx)).unwrap();
    drop(tx);
    let events: Vec<_> = rx.iter().collect();
    assert!(events.len() >= 3);
    assert_eq!(events.last().map(|e| e.percent), Some(100.0));
}

#[test]
fn test_failing_observer_aborts_the_batch() {
    let images = [scene(220, 170, 21), scene(200, 200, 22)];
    let views: Vec<_> = images.iter().map(GrayImage::view).collect();
    let first_units = compile(&views[..1], &config(), None).unwrap().targets[0].levels.len() + 1;

    // fail on the first report that belongs to the second image
    let mut calls = 0;
    let mut cancel = |_: f64| -> ProgressResult {
        calls += 1;
        if calls > first_units + 1 {
            return Err(ProgressError::new("cancelled by user"));
        }
        Ok(())
    };
    let result = compile(&views, &config(), Some(&mut cancel));
    match result {
        Err(CompileError::Progress(e)) => assert_eq!(e, ProgressError::new("cancelled by user")),
        other => panic!("expected a progress error, got {other:?}"),
    }
    assert_eq!(calls, first_units + 2);
}

#[test]
fn test_disconnected_channel_aborts_the_batch() {
    let img = scene(200, 200, 23);
    let (mut tx, rx) = channel::<ProgressEvent>();
    drop(rx);
    let result = compile(&[img.view()], &config(), Some(&mut tx));
    assert!(matches!(result, Err(CompileError::Progress(_))));
}

#[test]
fn test_empty_batch() {
    let mut calls = 0;
    let mut count = |_: f64| -> ProgressResult {
        calls += 1;
        Ok(())
    };
    let bundle = compile(&[], &config(), Some(&mut count)).unwrap();
    assert!(bundle.is_empty());
    assert_eq!(calls, 0);

    let parsed = CompiledBundle::from_bytes(&bundle.to_bytes()).unwrap();
    assert!(parsed.is_empty());
}

#[test]
fn test_tiny_image_is_invalid() {
    let img = GrayImage::filled(1, 1, 128);
    let result = compile(&[img.view()], &config(), None);
    assert!(matches!(result, Err(CompileError::InvalidImage { index: 0, .. })));
}

#[test]
fn test_invalid_image_reports_its_position() {
    let good = scene(200, 160, 11);
    let zero = RasterImage::new(0, 0, &[]);
    let mut calls = 0;
    let mut count = |_: f64| -> ProgressResult {
        calls += 1;
        Ok(())
    };
    let result = compile(&[good.view(), zero], &config(), Some(&mut count));
    assert!(matches!(result, Err(CompileError::InvalidImage { index: 1, .. })));
    assert_eq!(calls, 0);
}

#[test]
fn test_flat_image_has_no_features() {
    let img = GrayImage::filled(160, 160, 77);
    let result = compile(&[img.view()], &config(), None);
    assert!(matches!(result, Err(CompileError::NoFeatures { index: 0 })));
}

#[test]
fn test_failure_aborts_the_batch() {
    let good = scene(200, 160, 12);
    let flat = GrayImage::filled(128, 128, 40);
    let result = compile(&[good.view(), flat.view(), good.view()], &config(), None);
    assert!(matches!(result, Err(CompileError::NoFeatures { index: 1 })));
}

#[test]
fn test_keypoints_stay_clear_of_level_borders() {
    let img = scene(320, 240, 13);
    let cfg = config();
    let margin = cfg.detector.border_margin() as f32;
    let bundle = compile(&[img.view()], &cfg, None).unwrap();
    for level in &bundle.targets[0].levels {
        for kp in &level.keypoints {
            assert!(kp.x >= margin && kp.x <= level.width as f32 - 1.0 - margin);
            assert!(kp.y >= margin && kp.y <= level.height as f32 - 1.0 - margin);
        }
    }
}

#[test]
fn test_bundle_round_trip() {
    let images = [scene(240, 200, 14), scene(200, 240, 15)];
    let views: Vec<_> = images.iter().map(GrayImage::view).collect();
    let bundle = compile(&views, &config(), None).unwrap();

    let parsed = CompiledBundle::from_bytes(&bundle.to_bytes()).unwrap();
    assert_eq!(parsed.len(), bundle.len());
    for (p, t) in parsed.targets.iter().zip(&bundle.targets) {
        assert_eq!(p.levels.len(), t.levels.len());
        for (pl, tl) in p.levels.iter().zip(&t.levels) {
            assert_eq!(pl.keypoints.len(), tl.keypoints.len());
        }
        assert_eq!(p.descriptors(), t.descriptors());
        assert_eq!(p.index, t.index);
    }
    assert_eq!(parsed, bundle);
}

#[test]
fn test_lookups_survive_round_trip() {
    let img = scene(256, 200, 16);
    let bundle = compile(&[img.view()], &config(), None).unwrap();
    let parsed = CompiledBundle::from_bytes(&bundle.to_bytes()).unwrap();
    let (before, after) = (&bundle.targets[0], &parsed.targets[0]);

    for (_, kp) in before.keypoints().step_by(7) {
        let a = before.lookup(&kp.descriptor, kp.polarity, usize::MAX).unwrap();
        let b = after.lookup(&kp.descriptor, kp.polarity, usize::MAX).unwrap();
        assert_eq!(a.2, 0);
        assert_eq!(a, b);
        for polarity in [Polarity::Bright, Polarity::Dark] {
            assert_eq!(
                before.lookup(&kp.descriptor, polarity, 3),
                after.lookup(&kp.descriptor, polarity, 3)
            );
        }
    }
}

#[test]
fn test_bumped_version_is_rejected() {
    let img = scene(200, 160, 17);
    let mut bytes = compile(&[img.view()], &config(), None).unwrap().to_bytes();
    bytes[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
    match CompiledBundle::from_bytes(&bytes) {
        Err(CompileError::UnsupportedVersion { found, supported }) => {
            assert_eq!(found, FORMAT_VERSION + 1);
            assert_eq!(supported, FORMAT_VERSION);
        }
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
}

#[test]
fn test_truncated_bundle_is_a_format_error() {
    let img = scene(200, 160, 18);
    let bytes = compile(&[img.view()], &config(), None).unwrap().to_bytes();
    for cut in [1, 7, 33, bytes.len() / 2, bytes.len() - 16] {
        let result = CompiledBundle::from_bytes(&bytes[..bytes.len() - cut]);
        assert!(
            matches!(result, Err(CompileError::Format(FormatError::Truncated { .. }))),
            "cut {cut}: {result:?}"
        );
    }
}

#[test]
fn test_compiler_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Compiler>();

    let compiler = Compiler::new(config()).unwrap();
    let img = scene(200, 180, 19);
    let expected = compiler.compile(&[img.view()], None).unwrap();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..3)
            .map(|_| s.spawn(|| compiler.compile(&[img.view()], None).unwrap()))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_compile_target_matches_batch_entry() {
    let img = scene(230, 190, 20);
    let compiler = Compiler::new(config()).unwrap();
    let single = compiler.compile_target(img.view()).unwrap();
    let batch = compiler.compile(&[img.view()], None).unwrap();
    assert_eq!(batch.targets[0], single);
}
