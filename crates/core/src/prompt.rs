//! Prompt rendering for grounded answers.
//!
//! The instructions in the default template are a prompting convention only:
//! nothing here can verify that the model actually stayed within the
//! supplied context.

use crate::models::RetrievedChunk;

pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// Fixed reply the default template asks for when the context has no answer.
pub const NOT_FOUND_REPLY: &str = "知识库中未找到相关信息";

/// The manuals are Chinese, so the default instructions are too.
const IC_EXPERT_TEMPLATE: &str = concat!(
    "你是一名集成电路(IC)领域的资深技术专家。请基于下面的【参考资料】回答用户的问题。\n\n",
    "规则：\n",
    "1. 如果参考资料里有答案，请用专业、简洁的语言回答。\n",
    "2. 如果参考资料里没有答案，请直接说“知识库中未找到相关信息”，不要瞎编。\n",
    "3. 如果涉及 Verilog 代码，请确保语法正确。\n\n",
    "【参考资料】：\n{context}\n\n",
    "【用户问题】：\n{question}\n"
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: IC_EXPERT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Returns `None` unless both `{context}` and `{question}` appear.
    pub fn new(template: impl Into<String>) -> Option<Self> {
        let template = template.into();
        if template.contains(CONTEXT_PLACEHOLDER) && template.contains(QUESTION_PLACEHOLDER) {
            Some(Self { template })
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn render(&self, question: &str, chunks: &[RetrievedChunk]) -> String {
        let context = chunks
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        // Retrieved text is spliced in verbatim, never scanned for placeholders.
        let (head, tail) = match self.template.split_once(CONTEXT_PLACEHOLDER) {
            Some(parts) => parts,
            None => (self.template.as_str(), ""),
        };
        let mut rendered = head.replace(QUESTION_PLACEHOLDER, question);
        rendered.push_str(&context);
        rendered.push_str(&tail.replace(QUESTION_PLACEHOLDER, question));
        rendered
    }
}
