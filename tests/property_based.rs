use optipress::engine::{
    admit, fit_inside, percentage_saved, plan_transform, should_resize, SourceMetadata,
};
use optipress::{
    BatchExecutor, BatchOptions, InputItem, ProcessingSettings, ResizeMode, ResizeSettings,
    TargetFormat,
};
use proptest::prelude::*;

fn mode_strategy() -> impl Strategy<Value = ResizeMode> {
    prop_oneof![
        Just(ResizeMode::MaxWidth),
        Just(ResizeMode::MaxHeight),
        Just(ResizeMode::Both),
    ]
}

fn bound_strategy() -> impl Strategy<Value = Option<u32>> {
    prop_oneof![Just(None), Just(Some(0)), (1u32..=4096).prop_map(Some)]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn test_fit_inside_never_enlarges(
        orig_w in 1u32..=8192,
        orig_h in 1u32..=8192,
        max_w in proptest::option::of(1u32..=8192),
        max_h in proptest::option::of(1u32..=8192),
    ) {
        let (w, h) = fit_inside(orig_w, orig_h, max_w, max_h);
        prop_assert!(w >= 1 && h >= 1);
        prop_assert!(w <= orig_w && h <= orig_h);
        if let Some(mw) = max_w {
            prop_assert!(w <= mw);
        }
    }

    #[test]
    fn test_fit_inside_respects_both_bounds(
        orig_w in 1u32..=8192,
        orig_h in 1u32..=8192,
        max_w in 1u32..=8192,
        max_h in 1u32..=8192,
    ) {
        let (w, h) = fit_inside(orig_w, orig_h, Some(max_w), Some(max_h));
        prop_assert!(w <= max_w && h <= max_h);
        // one axis lands exactly on its bound unless nothing changed
        prop_assert!(w == max_w || h == max_h || (w, h) == (orig_w, orig_h));
    }

    #[test]
    fn test_should_resize_matches_table(
        cur_w in 1u32..=4096,
        cur_h in 1u32..=4096,
        width in bound_strategy(),
        height in bound_strategy(),
        mode in mode_strategy(),
    ) {
        let resize = ResizeSettings::new(width, height, mode);
        let w_over = width.filter(|&w| w > 0).is_some_and(|w| cur_w > w);
        let h_over = height.filter(|&h| h > 0).is_some_and(|h| cur_h > h);
        let expected = match mode {
            ResizeMode::MaxWidth => w_over,
            ResizeMode::MaxHeight => h_over,
            ResizeMode::Both => w_over || h_over,
        };
        prop_assert_eq!(should_resize(&resize, cur_w, cur_h), expected);
    }

    #[test]
    fn test_plan_resizes_only_when_decided(
        cur_w in 1u32..=4096,
        cur_h in 1u32..=4096,
        width in bound_strategy(),
        height in bound_strategy(),
        mode in mode_strategy(),
    ) {
        let resize = ResizeSettings::new(width, height, mode);
        let decided = should_resize(&resize, cur_w, cur_h);
        let settings = ProcessingSettings::new(TargetFormat::Png).with_resize(resize);
        let plan = plan_transform(&SourceMetadata::new("png", cur_w, cur_h), &settings);
        prop_assert_eq!(plan.should_resize(), decided);
        if let Some((w, h)) = plan.target_dimensions() {
            prop_assert!(w <= cur_w && h <= cur_h);
        }
    }

    #[test]
    fn test_percentage_sign_follows_size_change(
        original in 1u64..=10_000_000,
        processed in 0u64..=20_000_000,
    ) {
        let pct = percentage_saved(original, processed).unwrap();
        if processed < original {
            prop_assert!(pct >= 0);
        } else if processed > original {
            prop_assert!(pct <= 0);
        } else {
            prop_assert_eq!(pct, 0);
        }
        prop_assert!(pct <= 100);
    }

    #[test]
    fn test_admission_is_decided_by_size_and_extension(
        stem in "[a-z]{1,8}",
        ext in prop_oneof![Just("png"), Just("JPG"), Just("webp"), Just("bmp"), Just("txt")],
        declared in 0u64..=(100 * 1024 * 1024),
    ) {
        let item = InputItem::new(format!("{stem}.{ext}"), vec![0]).with_declared_size(declared);
        let supported = !matches!(ext, "bmp" | "txt");
        let fits = declared <= 50 * 1024 * 1024;
        prop_assert_eq!(admit(&item).is_ok(), supported && fits);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn test_batch_yields_one_record_per_item_in_order(
        names in proptest::collection::vec("[a-z]{1,6}\\.(png|txt|gif)", 0..12),
    ) {
        let items: Vec<InputItem> = names
            .iter()
            .map(|n| InputItem::new(n.clone(), b"junk".to_vec()))
            .collect();
        let executor = BatchExecutor::new(BatchOptions {
            worker_threads: 3,
            ..BatchOptions::default()
        })
        .unwrap();
        let records = executor
            .run(&items, &ProcessingSettings::new(TargetFormat::WebP))
            .unwrap();

        prop_assert_eq!(records.len(), items.len());
        for (record, name) in records.iter().zip(&names) {
            prop_assert_eq!(&record.original_name, name);
            // junk bytes never decode
            prop_assert!(record.is_error());
        }
    }
}
