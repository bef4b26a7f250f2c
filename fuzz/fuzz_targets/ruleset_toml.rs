#![no_main]

use ironwall_core::config::EngineSettings;
use ironwall_engine::Ruleset;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // TOML 파서는 &str을 받으므로 UTF-8 변환 필요
    if let Ok(toml_str) = std::str::from_utf8(data) {
        if let Ok(ruleset) = Ruleset::parse(toml_str, "fuzz-input.toml") {
            // 커밋 검증 실패는 정상 경로
            let _ = ruleset.build(&EngineSettings {
                stats_shards: 1,
                ..EngineSettings::default()
            });
        }
    }
});
