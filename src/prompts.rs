//! Prompts for the cleanup and vision-OCR calls.
//!
//! Every prompt lives here so the wording can change without touching the
//! request or timeout handling in [`crate::pipeline::llm`]. Callers can
//! replace the cleanup prompt via
//! [`crate::config::ConversionConfig::cleanup_prompt`]; a replacement must
//! keep the [`OCR_TEXT_PLACEHOLDER`].

/// Marker substituted with the region's OCR text.
pub const OCR_TEXT_PLACEHOLDER: &str = "{ocr_text}";

/// Default cleanup prompt: raw OCR text in, LaTeX-flavoured markup out.
///
/// Scanned documents in this pipeline are mostly Chinese reports, so the
/// instructions are written in Chinese.
pub const DEFAULT_CLEANUP_PROMPT: &str = r#"请整理下面这段OCR识别出的文本，输出LaTeX格式的正文片段。规则如下：

1. 页眉页脚
   - 删除页眉、页脚和页码等每页重复出现的内容

2. 最小化修正
   - 只改明显识别错误的字词（形近字、语义矛盾的词），改后的字形应与原字相近
   - 不增加、不删除内容，不调整段落和标点
   - 去掉多余的空格和断行
   - 删除空字节等控制字符和其他与XML/LaTeX不兼容的字符

3. 标题（有明显编号，如"一、""（一）""1."，通常不是完整句子）
   - 一级标题：\section{标题}
   - 二级标题：\subsection{标题}
   - 三级标题：\subsubsection{标题}

4. 段落
   - 段落之间用一个空行分隔，段首不加空格

5. 特殊字符转义
   - & → \&，% → \%，$ → \$，# → \#，^ → \^{}，_ → \_，{ → \{，} → \}，\ → \textbackslash{}

6. 表格
   - 文本中的表格用LaTeX表格语法表示，例如：
\begin{table}[h]
\centering
\begin{tabular}{cc}
\hline
项目名称 & 技术领域 \\
\hline
馈能式智能悬架 & 先进制造 \\
\hline
\end{tabular}
\caption{表格标题}
\end{table}

7. 输出
   - 只输出LaTeX正文，不要\documentclass和\begin{document}
   - 不要使用markdown，不要用```包裹
   - 不要附加任何说明或修改记录

待处理文本：
{ocr_text}"#;

/// Prompt for the vision fallback used when a text region came back empty.
pub const DEFAULT_OCR_PROMPT: &str = r#"Transcribe all text visible in this image exactly as written.

- Keep the original language; do not translate
- Keep line breaks where the image has them
- Output ONLY the transcribed text, with no commentary and no code fences
- If the image contains no text, output nothing"#;

/// Substitute the OCR text into a cleanup prompt template.
pub fn cleanup_prompt(template: &str, ocr_text: &str) -> String {
    template.replace(OCR_TEXT_PLACEHOLDER, ocr_text)
}
