use smol_str::SmolStr;

use crate::lua_value::LuaValue;
use super::error::LuaError;
use super::LuaVM;

/// A host-provided callable registered via `register_foreign` (spec.md
/// §6). Foreign calls run synchronously to completion and may not yield
/// (spec.md §5).
pub struct Foreign {
    pub name: SmolStr,
    func: Box<dyn Fn(&[LuaValue], &mut LuaVM) -> Result<Vec<LuaValue>, LuaError>>,
}

impl Foreign {
    pub fn new(
        name: impl Into<SmolStr>,
        func: impl Fn(&[LuaValue], &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> + 'static,
    ) -> Self {
        Foreign { name: name.into(), func: Box::new(func) }
    }

    pub fn call(&self, args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
        (self.func)(args, vm)
    }
}
