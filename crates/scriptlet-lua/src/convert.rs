//! Conversions between Lua values and channel [`Value`]s.

use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};
use scriptlet_channel::Value;
use std::collections::BTreeMap;

/// Maximum table nesting accepted from a script.
const MAX_DEPTH: usize = 64;

/// Converts a Lua value into a channel value.
///
/// Tables with a positive raw length become lists; other tables become
/// string-keyed maps. A table with both is rejected rather than truncated.
///
/// # Errors
///
/// Fails for functions, userdata, threads, non-string map keys and
/// tables nested deeper than the supported limit (cycles included).
pub fn lua_to_value(value: LuaValue) -> LuaResult<Value> {
    lua_to_value_at(value, 0)
}

fn lua_to_value_at(value: LuaValue, depth: usize) -> LuaResult<Value> {
    match value {
        LuaValue::Nil => Ok(Value::Null),
        LuaValue::Boolean(b) => Ok(Value::Bool(b)),
        LuaValue::Integer(i) => Ok(Value::Int(i)),
        LuaValue::Number(n) => Ok(Value::Float(n)),
        LuaValue::String(s) => Ok(Value::Str(s.to_str()?.to_string())),
        LuaValue::Table(table) => {
            if depth >= MAX_DEPTH {
                return Err(mlua::Error::RuntimeError(format!(
                    "value nested deeper than {MAX_DEPTH} levels"
                )));
            }
            table_to_value(&table, depth + 1)
        }
        other => Err(mlua::Error::RuntimeError(format!(
            "unsupported value type '{}'",
            other.type_name()
        ))),
    }
}

fn table_to_value(table: &Table, depth: usize) -> LuaResult<Value> {
    let len = table.raw_len();
    if len > 0 {
        for pair in table.pairs::<LuaValue, LuaValue>() {
            let (key, _) = pair?;
            let in_sequence = match key {
                LuaValue::Integer(i) => usize::try_from(i).is_ok_and(|i| (1..=len).contains(&i)),
                _ => false,
            };
            if !in_sequence {
                return Err(mlua::Error::RuntimeError(
                    "table mixes sequence and keyed entries".into(),
                ));
            }
        }
        let mut items = Vec::with_capacity(len);
        for i in 1..=len {
            let item: LuaValue = table.raw_get(i)?;
            items.push(lua_to_value_at(item, depth)?);
        }
        return Ok(Value::List(items));
    }
    let mut map = BTreeMap::new();
    for pair in table.pairs::<String, LuaValue>() {
        let (key, item) = pair?;
        map.insert(key, lua_to_value_at(item, depth)?);
    }
    Ok(Value::Map(map))
}

/// Converts a channel value into a Lua value.
///
/// # Errors
///
/// Fails only if the Lua VM cannot allocate.
pub fn value_to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
    match value {
        Value::Null => Ok(LuaValue::Nil),
        Value::Bool(b) => Ok(LuaValue::Boolean(*b)),
        Value::Int(i) => Ok(LuaValue::Integer(*i)),
        Value::Float(f) => Ok(LuaValue::Number(*f)),
        Value::Str(s) => Ok(LuaValue::String(lua.create_string(s)?)),
        Value::List(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, value_to_lua(lua, item)?)?;
            }
            Ok(LuaValue::Table(table))
        }
        Value::Map(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (key, item) in map {
                table.raw_set(key.as_str(), value_to_lua(lua, item)?)?;
            }
            Ok(LuaValue::Table(table))
        }
    }
}

/// Converts a list of names into a Lua sequence.
pub(crate) fn names_to_lua(lua: &Lua, names: &[String]) -> LuaResult<Table> {
    lua.create_sequence_from(names.iter().map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_round_trip() {
        let lua = Lua::new();
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Int(-3),
            Value::Float(2.5),
            Value::from("text"),
        ] {
            let lv = value_to_lua(&lua, &value).expect("to lua");
            assert_eq!(lua_to_value(lv).expect("from lua"), value);
        }
    }

    #[test]
    fn sequence_table_becomes_list() {
        let lua = Lua::new();
        let lv: LuaValue = lua.load("return {1, 2.5, 'x'}").eval().expect("eval");
        assert_eq!(
            lua_to_value(lv).expect("convert"),
            Value::List(vec![Value::Int(1), Value::Float(2.5), Value::from("x")])
        );
    }

    #[test]
    fn keyed_table_becomes_map() {
        let lua = Lua::new();
        let lv: LuaValue = lua.load("return {a = 1, b = {true}}").eval().expect("eval");
        let Value::Map(map) = lua_to_value(lv).expect("convert") else {
            panic!("expected map");
        };
        assert_eq!(map.get("a"), Some(&Value::Int(1)));
        assert_eq!(map.get("b"), Some(&Value::List(vec![Value::Bool(true)])));
    }

    #[test]
    fn lua_infinity_is_a_float() {
        let lua = Lua::new();
        let lv: LuaValue = lua.load("return math.huge").eval().expect("eval");
        assert_eq!(lua_to_value(lv).expect("convert"), Value::Float(f64::INFINITY));
    }

    #[test]
    fn functions_are_rejected() {
        let lua = Lua::new();
        let lv: LuaValue = lua.load("return function() end").eval().expect("eval");
        assert!(lua_to_value(lv).is_err());
    }

    #[test]
    fn mixed_tables_are_rejected() {
        let lua = Lua::new();
        let lv: LuaValue = lua
            .load(r#"return {1, 2, label = "kept?"}"#)
            .eval()
            .expect("eval");
        let err = lua_to_value(lv).expect_err("mixed table");
        assert!(err.to_string().contains("mixes sequence and keyed"));
    }

    #[test]
    fn cyclic_tables_are_rejected() {
        let lua = Lua::new();
        let lv: LuaValue = lua
            .load("local t = {}; t.self = t; return t")
            .eval()
            .expect("eval");
        assert!(lua_to_value(lv).is_err());
    }
}
