#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use optipress::{BatchExecutor, BatchOptions, InputItem, ProcessingSettings, TargetFormat};
use std::sync::OnceLock;

#[derive(Arbitrary, Debug)]
struct Input {
    files: Vec<(String, Vec<u8>)>,
    format_byte: u8,
    quality: u8,
    max_width: Option<u16>,
}

fn format_from_byte(b: u8) -> TargetFormat {
    match b % 4 {
        0 => TargetFormat::Jpeg,
        1 => TargetFormat::Png,
        2 => TargetFormat::WebP,
        _ => TargetFormat::Gif,
    }
}

fn executor() -> &'static BatchExecutor {
    static EXECUTOR: OnceLock<BatchExecutor> = OnceLock::new();
    EXECUTOR.get_or_init(|| {
        BatchExecutor::new(BatchOptions {
            worker_threads: 2,
            deadline: None,
            memory_budget_bytes: 256 * 1024 * 1024,
            include_original: false,
        })
        .expect("worker pool")
    })
}

fuzz_target!(|input: Input| {
    let items: Vec<InputItem> = input
        .files
        .into_iter()
        .take(8)
        .map(|(name, bytes)| InputItem::new(name, bytes))
        .collect();
    let mut settings = ProcessingSettings::new(format_from_byte(input.format_byte))
        .with_quality(input.quality.clamp(1, 100));
    if let Some(w) = input.max_width {
        settings = settings.with_resize(optipress::ResizeSettings::new(
            Some(u32::from(w)),
            None,
            optipress::ResizeMode::MaxWidth,
        ));
    }

    let records = executor()
        .run(&items, &settings)
        .expect("no deadline, so the batch always settles");
    assert_eq!(records.len(), items.len());
    for (record, item) in records.iter().zip(&items) {
        assert_eq!(record.original_name, item.name);
    }
});
