//! Traceback formatting (spec.md §4.7): one line per live call-stack
//! frame, innermost first, matching the shape `lua.c`'s default message
//! handler produces. `debug.traceback([thread,] [msg,] [level])` can ask
//! for another coroutine's saved frames instead of the running one's, and
//! can skip a given number of innermost frames — both handled by
//! `format_traceback_frames` below, shared by the two entry points.

use super::frame::CallFrame;
use super::LuaVM;
use crate::lua_value::Coroutine;

impl LuaVM {
    pub(crate) fn format_traceback(&self, skip: usize) -> String {
        self.format_traceback_frames(
            &self.call_stack,
            self.current_function_label.clone().to_string(),
            self.current_line(),
            skip,
        )
    }

    /// Same shape, but for a coroutine that is not currently running. Its
    /// saved call stack holds only *callers* of the frame that was live at
    /// suspension; that innermost frame's own label isn't saved anywhere
    /// (only its PC is, via `saved_pc`), so the innermost line falls back to
    /// the entry closure's name.
    pub(crate) fn format_traceback_for_coroutine(&self, co: &Coroutine, skip: usize) -> String {
        let label = co.function_name.clone().map(|s| s.to_string()).unwrap_or_else(|| "?".to_string());
        let line = self.code.get(co.saved_pc).map(|i| i.debug.line).unwrap_or(0);
        self.format_traceback_frames(&co.saved_frames, label, line, skip)
    }

    fn format_traceback_frames(
        &self,
        frames: &[CallFrame],
        innermost_label: String,
        innermost_line: u32,
        skip: usize,
    ) -> String {
        let mut entries = vec![(innermost_line, innermost_label, false, false)];
        for frame in frames.iter().rev() {
            if frame.is_resume_boundary() {
                entries.push((0, "?".to_string(), false, true));
                continue;
            }
            let line = self.code.get(frame.return_pc.saturating_sub(1)).map(|i| i.debug.line).unwrap_or(0);
            entries.push((line, frame.function_label.to_string(), frame.is_foreign, false));
        }
        let mut lines = vec!["stack traceback:".to_string()];
        for (line, label, foreign, boundary) in entries.into_iter().skip(skip) {
            if boundary {
                lines.push("\t[C]: in ?".to_string());
                continue;
            }
            let what = if foreign { "in foreign function" } else { "in function" };
            lines.push(format!("\t{}:{}: {} '{}'", self.source_name, line, what, label));
        }
        lines.join("\n")
    }
}
