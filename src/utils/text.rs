// 文本工具 - 猜名比对用的规范化

/// 转小写并把连续空白压成单个空格
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 规范化后的词列表
pub fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

pub fn sorted_tokens(text: &str) -> Vec<String> {
    let mut parts = tokens(text);
    parts.sort_unstable();
    parts
}
