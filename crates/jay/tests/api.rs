//! Embedding API tests: scripted setups driven through the public surface.

use jay::{Context, ExcKind, JsValue};
use pretty_assertions::assert_eq;

fn eval_number(ctx: &mut Context, source: &str) -> f64 {
    let value = ctx.eval(source).unwrap();
    let number = ctx.get_number_value(value).expect("expected a number");
    ctx.release_value(value);
    number
}

fn eval_string(ctx: &mut Context, source: &str) -> String {
    let value = ctx.eval(source).unwrap();
    let string = ctx.get_string(value).expect("expected a string");
    ctx.release_value(value);
    string
}

#[test]
fn this_bound_functions_observe_global_state() {
    let mut ctx = Context::new();
    let setup = ctx
        .eval("function f () { return this.t; } this.t = 1; this.foo = f;")
        .unwrap();
    ctx.release_value(setup);

    // Mutate `t` through the API, then call `foo` with the global `this`.
    let global = ctx.global().unwrap();
    let new_t = ctx.create_string("abcd").unwrap();
    assert!(ctx.set_property(global, "t", new_t).unwrap());
    ctx.release_value(new_t);

    let foo = ctx.get_property(global, "foo").unwrap();
    assert!(ctx.is_function(foo));
    let result = ctx.call_function(foo, global, &[]).unwrap();
    assert_eq!(ctx.get_string(result).as_deref(), Some("abcd"));
    assert_eq!(ctx.get_string_size(result), Some(4));
    ctx.release_value(result);
    ctx.release_value(foo);
    ctx.release_value(global);
}

#[test]
fn constructed_objects_reach_prototype_methods() {
    let mut ctx = Context::new();
    let result = ctx
        .eval(
            "function A () { this.t = 12; } \
             A.prototype.foo = function () { return this.t; }; \
             new A().foo()",
        )
        .unwrap();
    assert_eq!(ctx.get_number_value(result), Some(12.0));
    ctx.release_value(result);
}

fn external_handler(
    ctx: &mut Context,
    _func: JsValue,
    _this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsValue> {
    let args_ok = args.len() == 2
        && ctx.get_string(args[0]).as_deref() == Some("1")
        && ctx.get_boolean_value(args[1]) == Some(true);
    if !args_ok {
        return Err(jay::throw_type_error(ctx, "unexpected arguments"));
    }
    match ctx.create_string("string from handler") {
        Ok(result) => Ok(result),
        Err(_) => Err(jay::throw_type_error(ctx, "allocation failed")),
    }
}

#[test]
fn external_functions_dispatch_to_the_host() {
    let mut ctx = Context::new();
    let setup = ctx
        .eval("function call_external () { return this.external('1', true); }")
        .unwrap();
    ctx.release_value(setup);

    let external = ctx.create_external_function(external_handler).unwrap();
    assert!(ctx.is_function(external));
    assert!(ctx.is_constructor(external));
    let global = ctx.global().unwrap();
    assert!(ctx.set_property(global, "external", external).unwrap());
    ctx.release_value(external);

    let call_external = ctx.get_property(global, "call_external").unwrap();
    let result = ctx.call_function(call_external, global, &[]).unwrap();
    assert_eq!(ctx.get_string(result).as_deref(), Some("string from handler"));
    assert_eq!(ctx.get_string_size(result), Some(19));
    ctx.release_value(result);
    ctx.release_value(call_external);
    ctx.release_value(global);
}

#[test]
fn external_functions_support_construct() {
    let mut ctx = Context::new();
    let external = ctx.create_external_function(external_handler).unwrap();
    let arg_a = ctx.create_string("1").unwrap();
    let arg_b = ctx.create_boolean(true);
    // The handler's return value is a string, so [[Construct]] keeps the
    // freshly allocated object instead.
    let constructed = ctx.construct_object(external, &[arg_a, arg_b]).unwrap();
    assert!(ctx.is_object(constructed));
    ctx.release_value(constructed);
    ctx.release_value(arg_a);
    ctx.release_value(arg_b);
    ctx.release_value(external);
}

#[test]
fn arrays_round_trip_through_the_api() {
    let mut ctx = Context::new();
    let array = ctx.create_array(10).unwrap();
    assert!(ctx.is_array(array));
    assert_eq!(ctx.get_array_length(array).unwrap(), 10);

    let value = ctx.create_number(10.5).unwrap();
    assert!(ctx.set_property_by_index(array, 5, value).unwrap());
    ctx.release_value(value);

    let read_back = ctx.get_property_by_index(array, 5).unwrap();
    assert_eq!(ctx.get_number_value(read_back), Some(10.5));
    ctx.release_value(read_back);
    ctx.release_value(array);
}

#[test]
fn array_length_autogrows_in_script() {
    let mut ctx = Context::new();
    assert_eq!(eval_number(&mut ctx, "var a = []; a[5] = 10.5; a.length"), 6.0);
}

#[test]
fn strict_mode_assignment_to_eval_is_a_parse_time_syntax_error() {
    let mut ctx = Context::new();
    let error = ctx.eval("'use strict'; eval = 1").unwrap_err();
    assert_eq!(error.kind, Some(ExcKind::SyntaxError));
    // No byte code was committed: the context still works.
    assert_eq!(eval_number(&mut ctx, "2 + 2"), 4.0);
}

#[test]
fn thrown_values_surface_as_exceptions() {
    let mut ctx = Context::new();
    let error = ctx.eval("throw new TypeError('broken')").unwrap_err();
    assert_eq!(error.kind, Some(ExcKind::TypeError));
    assert_eq!(error.message, "broken");

    let error = ctx.eval("undefined_name").unwrap_err();
    assert_eq!(error.kind, Some(ExcKind::ReferenceError));
}

#[test]
fn object_keys_and_foreach_agree() {
    let mut ctx = Context::new();
    let obj = ctx.eval("this.p = {alpha: 32, bravo: false, charlie: 'x'}; this.p").unwrap();

    let keys = ctx.get_object_keys(obj).unwrap();
    assert_eq!(ctx.get_array_length(keys).unwrap(), 3);
    let first = ctx.get_property_by_index(keys, 0).unwrap();
    assert_eq!(ctx.get_string(first).as_deref(), Some("alpha"));
    ctx.release_value(first);
    ctx.release_value(keys);

    let mut seen = Vec::new();
    ctx.foreach_object_property(obj, |ctx, name, _value| {
        seen.push(ctx.get_string(name).unwrap());
        true
    })
    .unwrap();
    assert_eq!(seen, vec!["alpha", "bravo", "charlie"]);
    ctx.release_value(obj);
}

#[test]
fn property_descriptors_reflect_definitions() {
    let mut ctx = Context::new();
    let obj = ctx.create_object().unwrap();
    let value = ctx.create_number(7.0).unwrap();
    ctx.define_own_property(obj, "sealed", value, false, false, false).unwrap();
    ctx.release_value(value);

    let info = ctx.get_own_property_descriptor(obj, "sealed").unwrap().expect("present");
    assert!(!info.writable && !info.enumerable && !info.configurable);
    let stored = info.value.expect("data property");
    assert_eq!(ctx.get_number_value(stored), Some(7.0));
    ctx.release_value(stored);

    assert!(ctx.get_own_property_descriptor(obj, "missing").unwrap().is_none());
    ctx.release_value(obj);
}

#[test]
fn prototypes_are_readable_and_writable() {
    let mut ctx = Context::new();
    let parent = ctx.create_object().unwrap();
    let value = ctx.create_number(5.0).unwrap();
    ctx.set_property(parent, "inherited", value).unwrap();
    ctx.release_value(value);

    let child = ctx.create_object().unwrap();
    ctx.set_prototype(child, Some(parent)).unwrap();
    let through_chain = ctx.get_property(child, "inherited").unwrap();
    assert_eq!(ctx.get_number_value(through_chain), Some(5.0));
    ctx.release_value(through_chain);

    let proto = ctx.get_prototype(child).unwrap().expect("has a prototype");
    assert!(ctx.is_object(proto));
    ctx.release_value(proto);
    ctx.release_value(child);
    ctx.release_value(parent);
}

#[test]
fn native_handles_bind_and_read_back() {
    let mut ctx = Context::new();
    let obj = ctx.create_object().unwrap();
    ctx.set_object_native_handle(obj, 0x1234_5678, None).unwrap();
    assert_eq!(ctx.get_object_native_handle(obj), Some(0x1234_5678));

    let other = ctx.create_object().unwrap();
    assert_eq!(ctx.get_object_native_handle(other), None);
    ctx.release_value(other);
    ctx.release_value(obj);
}

#[test]
fn gc_keeps_handle_referenced_values_alive() {
    let mut ctx = Context::new();
    let kept = ctx.eval("({ marker: 'survivor' })").unwrap();
    let before = ctx.heap_stats().live_objects;
    ctx.gc();
    assert!(ctx.heap_stats().live_objects <= before);
    let marker = ctx.get_property(kept, "marker").unwrap();
    assert_eq!(ctx.get_string(marker).as_deref(), Some("survivor"));
    ctx.release_value(marker);
    ctx.release_value(kept);
}

#[test]
fn eval_completion_values_flow_through_statements() {
    let mut ctx = Context::new();
    assert_eq!(eval_string(&mut ctx, "'direct string'"), "direct string");
    assert_eq!(eval_number(&mut ctx, "var x; x = 3; x * 7"), 21.0);
}

#[test]
fn register_magic_strings_is_idempotent() {
    let mut ctx = Context::new();
    ctx.register_magic_strings(&["customOne", "customTwo"]);
    ctx.register_magic_strings(&["customOne"]);
    assert_eq!(eval_number(&mut ctx, "this.customOne = 9; customOne"), 9.0);
}
