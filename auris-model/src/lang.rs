/// Language preference order for conflict recommendations. Simplified
/// Chinese wins, Traditional Chinese next, then the Japanese original,
/// then everything else.
pub fn lang_priority(code: &str) -> u8 {
    match code {
        "CHI_HANS" => 1,
        "CHI_HANT" => 2,
        "JPN" => 3,
        "ENG" => 4,
        "KO_KR" => 5,
        "SPA" => 6,
        "FRE" => 7,
        "GER" => 8,
        "RUS" => 9,
        "THA" => 10,
        "VIE" => 11,
        "ITA" => 12,
        "POR" => 13,
        _ => 99,
    }
}

/// Human-readable language label for operator-facing messages.
pub fn lang_name(code: &str) -> &str {
    match code {
        "CHI_HANS" => "简体中文",
        "CHI_HANT" => "繁体中文",
        "JPN" => "日文",
        "ENG" => "英文",
        "KO_KR" => "韩语",
        "SPA" => "西班牙语",
        "FRE" => "法语",
        "GER" => "德语",
        "RUS" => "俄语",
        "THA" => "泰语",
        "VIE" => "越南语",
        "ITA" => "意大利语",
        "POR" => "葡萄牙语",
        other => other,
    }
}
