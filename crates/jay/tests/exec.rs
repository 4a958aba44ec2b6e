//! Language behavior tests driven through `Context::eval`.

use jay::{Context, ExcKind};
use pretty_assertions::assert_eq;

fn number(source: &str) -> f64 {
    let mut ctx = Context::new();
    let value = ctx.eval(source).unwrap();
    let number = ctx.get_number_value(value).unwrap_or_else(|| panic!("expected number from {source:?}"));
    ctx.release_value(value);
    number
}

fn string(source: &str) -> String {
    let mut ctx = Context::new();
    let value = ctx.eval(source).unwrap();
    let string = ctx.get_string(value).unwrap_or_else(|| panic!("expected string from {source:?}"));
    ctx.release_value(value);
    string
}

fn boolean(source: &str) -> bool {
    let mut ctx = Context::new();
    let value = ctx.eval(source).unwrap();
    let boolean = ctx
        .get_boolean_value(value)
        .unwrap_or_else(|| panic!("expected boolean from {source:?}"));
    ctx.release_value(value);
    boolean
}

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(number("1 + 2 * 3"), 7.0);
    assert_eq!(number("(1 + 2) * 3"), 9.0);
    assert_eq!(number("10 % 3"), 1.0);
    assert_eq!(number("2 * 3 + 4 * 5"), 26.0);
    assert_eq!(number("100 / 8"), 12.5);
    assert_eq!(number("1 - 2 - 3"), -4.0);
}

#[test]
fn string_concatenation_beats_addition() {
    assert_eq!(string("'a' + 1 + 2"), "a12");
    assert_eq!(number("1 + 2 + Number('3')"), 6.0);
    assert_eq!(string("'sum: ' + (1 + 2)"), "sum: 3");
}

#[test]
fn comparison_and_equality() {
    assert!(boolean("1 < 2"));
    assert!(boolean("'a' < 'b'"));
    assert!(boolean("2 >= 2"));
    assert!(boolean("1 == '1'"));
    assert!(!boolean("1 === '1'"));
    assert!(boolean("null == undefined"));
    assert!(!boolean("null === undefined"));
    assert!(!boolean("NaN == NaN"));
    assert!(boolean("'' == 0"));
}

#[test]
fn logical_operators_short_circuit() {
    assert_eq!(number("1 && 2"), 2.0);
    assert_eq!(number("0 || 3"), 3.0);
    assert_eq!(number("var n = 0; function bump() { n = n + 1; return true; } false && bump(); n"), 0.0);
    assert_eq!(number("var n = 0; function bump() { n = n + 1; return true; } true || bump(); n"), 0.0);
    assert_eq!(number("var n = 0; function bump() { n = n + 1; return true; } true && bump(); n"), 1.0);
}

#[test]
fn ternary_expressions() {
    assert_eq!(number("1 ? 2 : 3"), 2.0);
    assert_eq!(number("0 ? 2 : 3"), 3.0);
    assert_eq!(string("!'' ? 'yes' : 'no'"), "yes");
    assert_eq!(number("1 ? 0 ? 4 : 5 : 6"), 5.0);
}

#[test]
fn bitwise_and_shift_operators() {
    assert_eq!(number("0xFF & 0x0F"), 15.0);
    assert_eq!(number("1 | 6"), 7.0);
    assert_eq!(number("5 ^ 3"), 6.0);
    assert_eq!(number("~0"), -1.0);
    assert_eq!(number("1 << 4"), 16.0);
    assert_eq!(number("-8 >> 1"), -4.0);
    assert_eq!(number("-1 >>> 28"), 15.0);
}

#[test]
fn compound_assignment_and_increments() {
    assert_eq!(number("var x = 10; x += 5; x"), 15.0);
    assert_eq!(number("var x = 10; x -= 2.5; x"), 7.5);
    assert_eq!(number("var x = 3; x *= x; x"), 9.0);
    assert_eq!(number("var x = 5; x++"), 5.0);
    assert_eq!(number("var x = 5; x++; x"), 6.0);
    assert_eq!(number("var x = 5; ++x"), 6.0);
    assert_eq!(number("var x = 5; --x; x--; x"), 3.0);
    assert_eq!(number("var o = {n: 1}; o.n += 2; o.n++; o.n"), 4.0);
}

#[test]
fn negative_zero_is_preserved() {
    assert_eq!(number("var v = -0; 1 / v"), f64::NEG_INFINITY);
    assert_eq!(number("1 / (0)"), f64::INFINITY);
}

#[test]
fn while_loops_and_conditionals() {
    assert_eq!(
        number("var total = 0; var i = 0; while (i < 10) { total += i; i++; } total"),
        45.0
    );
    assert_eq!(number("var x = 1; if (x > 0) { x = 2; } else { x = 3; } x"), 2.0);
    assert_eq!(number("var x = -1; if (x > 0) x = 2; else x = 3; x"), 3.0);
}

#[test]
fn functions_and_closures() {
    assert_eq!(number("function add(a, b) { return a + b; } add(2, 3)"), 5.0);
    assert_eq!(number("function outer(x) { return function () { return x; }; } outer(7)()"), 7.0);
    assert_eq!(
        number("function counter(start) { return function () { start += 1; return start; }; } var c = counter(10); c(); c()"),
        12.0
    );
    // Missing arguments bind undefined; extra ones are dropped.
    assert_eq!(string("function t(a) { return typeof a; } t()"), "undefined");
    assert_eq!(number("function first(a) { return a; } first(1, 2, 3)"), 1.0);
}

#[test]
fn arguments_object() {
    assert_eq!(number("function count() { return arguments.length; } count(1, 'x', true)"), 3.0);
    assert_eq!(string("function second() { return arguments[1]; } second('a', 'b')"), "b");
}

#[test]
fn object_literals_and_member_access() {
    assert_eq!(number("var o = {a: 1, b: {c: 2}}; o.a + o.b.c"), 3.0);
    assert_eq!(number("var o = {}; o.x = 41; o.x + 1"), 42.0);
    assert_eq!(number("var o = {'with space': 9}; o['with space']"), 9.0);
    assert_eq!(number("var o = {1: 'one', two: 2}; o.two"), 2.0);
    assert_eq!(string("var o = {1: 'one'}; o[1]"), "one");
}

#[test]
fn accessor_shorthands_in_object_literals() {
    assert_eq!(
        number("var o = { _v: 1, get v() { return this._v * 2; }, set v(x) { this._v = x; } }; o.v = 10; o.v"),
        20.0
    );
}

#[test]
fn array_literals_and_methods() {
    assert_eq!(number("[1, 2, 3].length"), 3.0);
    assert_eq!(number("[, , 5].length"), 3.0);
    assert_eq!(number("[, , 5][2]"), 5.0);
    assert_eq!(string("[1, 2, 3].join('-')"), "1-2-3");
    assert_eq!(number("var a = [1]; a.push(2, 3); a.length"), 3.0);
    assert_eq!(number("var a = [1, 2, 3]; a.pop() + a.length"), 5.0);
    assert_eq!(number("[5, 6, 7].indexOf(7)"), 2.0);
    assert_eq!(number("[1, 2].concat([3, 4]).length"), 4.0);
    assert!(boolean("Array.isArray([])"));
    assert!(!boolean("Array.isArray({})"));
}

#[test]
fn constructors_and_instanceof() {
    assert!(boolean("function F() {} new F() instanceof F"));
    assert!(boolean("function F() {} var o = new F(); F.prototype.isPrototypeOf(o)"));
    assert_eq!(number("function P(x, y) { this.x = x; this.y = y; } var p = new P(3, 4); p.x * p.y"), 12.0);
    // A constructor returning an object overrides the fresh one.
    assert_eq!(number("function R() { return {v: 99}; } new R().v"), 99.0);
    assert!(boolean("function F() {} F.prototype.constructor === F"));
}

#[test]
fn function_metadata_is_lazy_but_correct() {
    assert_eq!(number("function f(a, b) {} f.length"), 2.0);
    assert_eq!(string("function f() {} typeof f.prototype"), "object");
}

#[test]
fn bound_functions() {
    assert_eq!(
        string("function who() { return this.name; } var bound = who.bind({name: 'jay'}); bound()"),
        "jay"
    );
    assert_eq!(
        number("function add(a, b, c) { return a + b + c; } var add5 = add.bind(null, 2, 3); add5(4)"),
        9.0
    );
    assert_eq!(number("function add(a, b) { return a + b; } add.bind(null, 1).length"), 1.0);
    // Constructing through a bound function ignores the bound this.
    assert!(boolean(
        "function T(v) { this.v = v; } var B = T.bind({ignored: true}, 5); new B().v === 5"
    ));
    assert!(boolean("function T() {} var B = T.bind(null); new B() instanceof T"));
}

#[test]
fn call_and_apply() {
    assert_eq!(number("function f(a, b) { return this.base + a + b; } f.call({base: 1}, 2, 3)"), 6.0);
    assert_eq!(number("function f(a, b) { return this.base + a + b; } f.apply({base: 1}, [2, 3])"), 6.0);
}

#[test]
fn typeof_void_delete() {
    assert_eq!(string("typeof 1"), "number");
    assert_eq!(string("typeof 'x'"), "string");
    assert_eq!(string("typeof true"), "boolean");
    assert_eq!(string("typeof undefined"), "undefined");
    assert_eq!(string("typeof null"), "object");
    assert_eq!(string("typeof {}"), "object");
    assert_eq!(string("typeof function () {}"), "function");
    // typeof of an unresolvable identifier does not throw.
    assert_eq!(string("typeof never_defined_anywhere"), "undefined");
    assert_eq!(string("typeof void 0"), "undefined");
    assert!(boolean("var o = {p: 1}; delete o.p"));
    assert_eq!(string("var o = {p: 1}; delete o.p; typeof o.p"), "undefined");
}

#[test]
fn in_operator() {
    assert!(boolean("'a' in {a: 1}"));
    assert!(!boolean("'b' in {a: 1}"));
    assert!(boolean("'toString' in {}"));
}

#[test]
fn builtin_constants_and_math() {
    assert!(boolean("isNaN(NaN)"));
    assert!(!boolean("isFinite(Infinity)"));
    assert_eq!(number("Math.floor(1.7) + Math.ceil(0.2)"), 2.0);
    assert_eq!(number("Math.abs(-4)"), 4.0);
    assert_eq!(number("Math.pow(2, 10)"), 1024.0);
    assert_eq!(number("Math.max(1, 9, 4)"), 9.0);
    assert_eq!(number("Math.min(5, -2)"), -2.0);
    assert_eq!(number("Math.round(2.5)"), 3.0);
    assert_eq!(number("Math.sqrt(Math.pow(3, 2) + Math.pow(4, 2))"), 5.0);
    assert!(boolean("var r = Math.random(); r >= 0 && r < 1"));
    assert!(boolean("Number.MAX_VALUE > 0 && Number.MIN_VALUE > 0"));
    assert!(boolean("Math.PI > 3.14 && Math.PI < 3.15"));
    assert_eq!(number("parseInt('0x10')"), 16.0);
    assert_eq!(number("parseFloat('2.5rem')"), 2.5);
}

#[test]
fn string_builtin_methods() {
    assert_eq!(number("'hello'.length"), 5.0);
    assert_eq!(string("'hello'.charAt(1)"), "e");
    assert_eq!(number("'hello'.charCodeAt(0)"), 104.0);
    assert_eq!(number("'hello'.indexOf('llo')"), 2.0);
    assert_eq!(string("'hello'.substring(1, 3)"), "el");
    assert_eq!(string("'hello'.slice(-3)"), "llo");
    assert_eq!(string("String.fromCharCode(106, 97, 121)"), "jay");
    assert_eq!(string("String(42)"), "42");
    assert_eq!(number("new String('abc').length"), 3.0);
}

#[test]
fn number_formatting() {
    assert_eq!(string("String(1)"), "1");
    assert_eq!(string("String(10.5)"), "10.5");
    assert_eq!(string("String(1 / 0)"), "Infinity");
    assert_eq!(string("String(0 / 0)"), "NaN");
    assert_eq!(string("(255).toString(16)"), "ff");
    assert_eq!(number("Number('0x1f')"), 31.0);
    assert_eq!(number("Number(true)"), 1.0);
    assert!(boolean("isNaN(Number('12px'))"));
}

#[test]
fn error_objects_and_hierarchy() {
    assert_eq!(string("new TypeError('oops').message"), "oops");
    assert_eq!(string("new RangeError('r').name"), "RangeError");
    assert_eq!(string("new Error('x').toString()"), "Error: x");
    assert!(boolean("new TypeError('') instanceof TypeError"));
    assert!(boolean("new TypeError('') instanceof Error"));
    assert!(!boolean("new Error('') instanceof TypeError"));
}

#[test]
fn direct_and_indirect_eval() {
    assert_eq!(number("eval('1 + 2')"), 3.0);
    assert_eq!(number("function f(x) { return eval('x * 2'); } f(21)"), 42.0);
    assert_eq!(number("eval('var inner = 5; inner')"), 5.0);
}

#[test]
fn strict_mode_functions_poison_caller_and_arguments() {
    let mut ctx = Context::new();
    let error = ctx
        .eval("function s() { 'use strict'; return 1; } s.caller")
        .unwrap_err();
    assert_eq!(error.kind, Some(ExcKind::TypeError));
}

#[test]
fn strict_mode_keeps_this_unconverted() {
    let mut ctx = Context::new();
    let value = ctx.eval("function s() { 'use strict'; return this; } s()").unwrap();
    assert!(ctx.is_undefined(value));
    ctx.release_value(value);

    // Sloppy functions get the global object instead.
    let value = ctx.eval("function l() { return this; } l() === this").unwrap();
    assert_eq!(ctx.get_boolean_value(value), Some(true));
    ctx.release_value(value);
}

#[test]
fn deleted_builtins_stay_deleted() {
    let mut ctx = Context::new();
    let value = ctx
        .eval("var before = typeof Object.keys; delete Object.keys; before + ':' + typeof Object.keys")
        .unwrap();
    assert_eq!(ctx.get_string(value).as_deref(), Some("function:undefined"));
    ctx.release_value(value);
}

#[test]
fn object_builtin_routines() {
    assert_eq!(number("Object.keys({a: 1, b: 2}).length"), 2.0);
    assert!(boolean("({a: 1}).hasOwnProperty('a')"));
    assert!(!boolean("({a: 1}).hasOwnProperty('toString')"));
    assert_eq!(string("({}).toString()"), "[object Object]");
    assert_eq!(string("Object.prototype.toString.call([])"), "[object Array]");
    assert!(boolean("Object.getPrototypeOf({}) === Object.prototype"));
    assert_eq!(
        number("var o = {}; Object.defineProperty(o, 'x', {value: 4, writable: false}); o.x = 9; o.x"),
        4.0
    );
}

#[test]
fn regexp_literals_parse_into_records() {
    assert_eq!(string("/ab+c/gi.source"), "ab+c");
    assert_eq!(string("/ab+c/gi.flags"), "gi");
}

#[test]
fn throw_statement_propagates() {
    let mut ctx = Context::new();
    let error = ctx.eval("throw 'plain value'").unwrap_err();
    assert_eq!(error.message, "plain value");
}

#[test]
fn comma_and_grouping() {
    assert_eq!(number("(1, 2, 3)"), 3.0);
    assert_eq!(number("var f = function (x) { return x; }; f((1, 5))"), 5.0);
}

#[test]
fn recursion_works_and_overflow_is_a_range_error() {
    assert_eq!(number("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } fib(15)"), 610.0);
    let mut ctx = Context::new();
    let error = ctx.eval("function forever() { return forever(); } forever()").unwrap_err();
    assert_eq!(error.kind, Some(ExcKind::RangeError));
}
