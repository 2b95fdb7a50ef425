//! 检索关键词抽取
//!
//! 启发式词袋而非分词器：CJK 连续词块（jieba）、独立数值、工具名、
//! 已知单位名（原样出现在查询里才算）。数值与工具名是强关键词，
//! 打分时占更高权重，用于区分「语义接近但作战含义不同」的条目。

use std::sync::OnceLock;

use jieba_rs::Jieba;

/// 全局 Jieba 实例（延迟初始化）
static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |   // CJK Unified Ideographs
        '\u{3400}'..='\u{4DBF}' |   // CJK Unified Ideographs Extension A
        '\u{F900}'..='\u{FAFF}'     // CJK Compatibility Ideographs
    )
}

/// 单个关键词；strong 表示数值或工具名（占更高打分权重）
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub text: String,
    pub strong: bool,
}

/// 从查询中抽取去重后的关键词袋
pub fn extract_keywords(query: &str, tool_names: &[String], units: &[&str]) -> Vec<Keyword> {
    let mut keywords: Vec<Keyword> = Vec::new();
    let mut push = |text: String, strong: bool| {
        if text.is_empty() {
            return;
        }
        if let Some(existing) = keywords.iter_mut().find(|k| k.text == text) {
            // 同词以强标记为准
            existing.strong |= strong;
            return;
        }
        keywords.push(Keyword { text, strong });
    };

    // CJK 词块：jieba 搜索引擎模式，单字 CJK 丢弃
    if query.chars().any(is_cjk) {
        for word in get_jieba().cut_for_search(query, true) {
            let word = word.trim();
            if word.chars().count() > 1 && word.chars().all(is_cjk) {
                push(word.to_string(), false);
            }
        }
    }

    // 独立数值（如 500、0.35）
    for token in numeric_tokens(query) {
        push(token, true);
    }

    // 工具名与已知单位名：原样出现才算
    for name in tool_names {
        if query.contains(name.as_str()) {
            push(name.clone(), true);
        }
    }
    for unit in units {
        if query.contains(unit) {
            push((*unit).to_string(), false);
        }
    }

    keywords
}

/// 扫描数字串（允许小数点），如 "500米" 里的 "500"
fn numeric_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() || (c == '.' && !current.is_empty()) {
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current).trim_end_matches('.').to_string());
        }
    }
    if !current.is_empty() {
        tokens.push(current.trim_end_matches('.').to_string());
    }
    tokens
}

/// 关键词在文本中的出现次数
pub fn occurrence_count(text: &str, keyword: &str) -> usize {
    if keyword.is_empty() {
        return 0;
    }
    text.matches(keyword).count()
}
