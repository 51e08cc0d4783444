//! # 查询文本与调用栈格式化
//!
//! SQL 美化交给 `sqlformat`：关键字大写、按子句重新缩进，
//! 字符串字面量与注释保持原样。

use std::backtrace::Backtrace;

use sqlformat::{FormatOptions, QueryParams};

/// 录制器自身的栈帧标记，快照从最后一个匹配帧之后开始
const RECORDER_FRAME_MARKERS: &[&str] = &["InterceptedExecutor", "formatter::capture_stack"];

/// 查询文本格式化器
pub struct QueryFormatter;

impl QueryFormatter {
    /// 格式化 SQL：关键字大写并按子句重新缩进
    #[must_use]
    pub fn format(sql: &str) -> String {
        if sql.trim().is_empty() {
            return String::new();
        }

        let options = FormatOptions {
            uppercase: Some(true),
            ..FormatOptions::default()
        };
        sqlformat::format(sql, &QueryParams::None, &options)
    }
}

/// 抓取当前调用栈的文本快照，最多保留 `max_lines` 行
///
/// 录制器内部的栈帧会被跳过，行数配额只花在调用方的栈帧上。
#[must_use]
pub fn capture_stack(max_lines: usize) -> String {
    call_site_frames(&Backtrace::force_capture().to_string(), max_lines)
}

/// 从渲染好的调用栈中去掉录制器自身的帧并截断
fn call_site_frames(rendered: &str, max_lines: usize) -> String {
    let mut frames: Vec<Vec<&str>> = Vec::new();
    for line in rendered.lines() {
        match frames.last_mut() {
            Some(frame) if !is_frame_start(line) => frame.push(line),
            _ => frames.push(vec![line]),
        }
    }

    let first_call_site = frames
        .iter()
        .rposition(|frame| {
            frame
                .first()
                .is_some_and(|symbol| RECORDER_FRAME_MARKERS.iter().any(|marker| symbol.contains(marker)))
        })
        .map_or(0, |index| index + 1);

    let mut lines = frames[first_call_site..].iter().flatten().copied();
    let mut snapshot: Vec<&str> = lines.by_ref().take(max_lines).collect();
    if lines.next().is_some() {
        snapshot.push("...");
    }
    snapshot.join("\n")
}

/// 帧首行形如 `  12: crate::module::function`
fn is_frame_start(line: &str) -> bool {
    line.trim_start()
        .split_once(':')
        .is_some_and(|(index, _)| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn trimmed_lines(formatted: &str) -> Vec<&str> {
        formatted.lines().map(str::trim).collect()
    }

    #[test]
    fn test_uppercases_keywords_and_reindents() {
        let formatted = QueryFormatter::format(
            "select id, name from users where id = ? and active = 1 order by name",
        );
        let lines = trimmed_lines(&formatted);

        assert_eq!(lines.first(), Some(&"SELECT"));
        assert!(lines.contains(&"FROM"));
        assert!(lines.contains(&"WHERE"));
        assert!(lines.contains(&"AND active = 1"));
        assert!(lines.contains(&"ORDER BY"));
        assert!(!formatted.contains("select"));
    }

    #[test]
    fn test_literals_are_untouched() {
        let formatted = QueryFormatter::format("select * from t where note = 'select from where'");
        assert!(formatted.contains("'select from where'"));
        assert!(formatted.starts_with("SELECT"));
    }

    #[test]
    fn test_line_comment_keeps_its_extent() {
        let formatted = QueryFormatter::format("select a -- from legacy\n, b from t");

        let commented: Vec<&str> = formatted.lines().filter(|line| line.contains("legacy")).collect();
        assert_eq!(commented.len(), 1);
        assert!(commented[0].trim_end().ends_with("-- from legacy"));
        assert_eq!(formatted.matches("FROM").count(), 1);
    }

    #[test]
    fn test_block_comment_is_preserved_verbatim() {
        let formatted = QueryFormatter::format("select /* where and */ a from t");

        assert!(formatted.contains("/* where and */"));
        assert!(!formatted.contains("WHERE"));
        assert!(!formatted.contains("AND"));
    }

    #[test]
    fn test_blank_input_stays_blank() {
        assert_eq!(QueryFormatter::format(""), "");
        assert_eq!(QueryFormatter::format("  \n\t "), "");
    }

    #[test]
    fn test_capture_stack_respects_limit() {
        let stack = capture_stack(3);
        assert!(stack.lines().count() <= 4);
    }

    #[test]
    fn test_recorder_frames_are_skipped() {
        let rendered = "   0: std::backtrace::Backtrace::force_capture
             at /rustc/library/std/src/backtrace.rs:312:9
   1: sql_recorder::recorder::formatter::capture_stack
             at ./src/recorder/formatter.rs:40:5
   2: sql_recorder::recorder::interceptor::InterceptedExecutor::capture::{{closure}}
             at ./src/recorder/interceptor.rs:105:17
   3: <sql_recorder::recorder::interceptor::InterceptedExecutor as QueryExecutor>::query_all::{{closure}}
             at ./src/recorder/interceptor.rs:160:9
   4: sql_recorder::management::handlers::system::get_system_info::{{closure}}
             at ./src/management/handlers/system.rs:64:25
   5: tokio::runtime::task::harness::poll";

        let snapshot = call_site_frames(rendered, 2);
        assert_eq!(
            snapshot,
            "   4: sql_recorder::management::handlers::system::get_system_info::{{closure}}\n             at ./src/management/handlers/system.rs:64:25\n..."
        );
    }

    #[test]
    fn test_stack_without_recorder_frames_is_kept() {
        let rendered = "   0: app::main\n   1: std::rt::lang_start";
        assert_eq!(call_site_frames(rendered, 10), rendered);
    }
}
