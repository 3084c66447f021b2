// src/options/prompt.rs
use super::normalize::letters;

pub const SYSTEM_PROMPT: &str = "你是一个擅长生成互动小说选项的编剧，输出必须简洁、中文、具代入感。";
pub const STYLE_HINT: &str = "中文表达；强情感；生动但简洁；不含命令/系统语。";
const NO_QUOTE: &str = "（无原文，生成一个遇到重要角色的通用浪漫场景）";

/// User prompt asking for `count` labelled choices reacting to `base_text`
pub fn build_prompt(base_text: &str, count: usize, template: &str) -> String {
    let labels = letters(count)
        .iter()
        .map(char::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let template = template.trim_end();
    let quoted = if base_text.is_empty() { NO_QUOTE } else { base_text };

    let mut prompt = format!(
        "请基于这段原文所描述的情境，生成 {} 个极具 GalGame 风格 的下一步选项。\n",
        count
    );
    if template.is_empty() {
        prompt.push('\n');
    } else {
        prompt.push_str(template);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!("触发选项的对方所说的话：【{}】\n", quoted));
    prompt.push_str(&format!("你必须遵循的风格/提示：【{}】\n", STYLE_HINT));
    prompt.push_str(&format!("需要的选项代号：{}。\n", labels));
    prompt
}
