use caffeinec::ir::{BlockId, Terminator};
use caffeinec::types::Ty;
use caffeinec::{compile_file, compile_source, CompilationUnit, PackageCache};
use std::fs;

fn compile(source: &str) -> CompilationUnit {
    compile_source(source).expect("compilation failed")
}

fn compile_err(source: &str) -> String {
    match compile_source(source) {
        Ok(_) => panic!("expected a compile error for {source:?}"),
        Err(err) => err.to_string(),
    }
}

#[test]
fn main_returns_zero() {
    let text = compile("").module.to_string();
    assert!(text.contains("define i32 @main()"));
    assert!(text.contains("ret i32 0"));
}

#[test]
fn arithmetic_respects_precedence() {
    let text = compile("var x: int = 2 + 3 * 4;").module.to_string();
    assert!(text.contains("%t0 = mul i64 3, 4"));
    assert!(text.contains("%t1 = add i64 2, %t0"));
    assert!(text.contains("%t2 = alloca i64"));
    assert!(text.contains("store i64 %t1, i64* %t2"));
}

#[test]
fn durations_become_second_constants() {
    let text = compile("var a: duration = 1h;\nvar b: duration = 500ms;")
        .module
        .to_string();
    assert!(text.contains("store double 3600.0"));
    assert!(text.contains("store double 0.5"));
}

#[test]
fn string_literals_allocate_and_store_bytes() {
    let text = compile("var s: string = \"hi\";").module.to_string();
    assert!(text.contains("declare i8* @malloc(i64)"));
    assert!(text.contains("call i8* @malloc(i64 3)"));
    assert!(text.contains("store i8 104"));
    assert!(text.contains("store i8 105"));
    assert!(text.contains("store i8 0, i8*"));
}

#[test]
fn extern_declaration_and_call() {
    let text = compile("extern func puts(s: string): int;\nputs(\"ok\");")
        .module
        .to_string();
    assert!(text.contains("declare i64 @puts(i8*)"));
    assert!(text.contains("call i64 @puts(i8* %t0)"));
}

#[test]
fn free_variables_become_trailing_parameters() {
    let unit = compile(
        "var x: int = 5;\n\
         func f(): int {\n    return x;\n}\n\
         f();",
    );

    let f = unit.module.function("f").expect("f");
    assert_eq!(f.params, vec![("x".to_string(), Ty::ptr_to(Ty::I64))]);

    // Call sites are unaware of the appended parameters.
    let text = unit.module.to_string();
    assert!(text.contains("call i64 @f()"));

    // The analysis pass leaves nothing behind.
    assert!(unit.module.function("f.scratch").is_none());
}

#[test]
fn missing_return_on_one_armed_if() {
    let err = compile_err("func f(): int {\n    if (1 < 2) {\n        return 1;\n    }\n}");
    assert!(err.contains("does not return"), "unexpected error: {err}");
    assert!(err.contains("`f`"), "unexpected error: {err}");
}

#[test]
fn return_in_both_arms_satisfies_the_check() {
    let unit = compile(
        "func sign(n: int): int {\n\
         \x20   if (n < 0) {\n        return 0 - 1;\n    } else {\n        return 1;\n    }\n\
         }",
    );
    // The orphaned merge block stays in the output as unreachable.
    let text = unit.module.to_string();
    assert!(text.contains("define i64 @sign"));
    assert!(text.contains("unreachable"));
}

#[test]
fn loop_condition_is_emitted_twice() {
    let text = compile(
        "var i: int = 0;\n\
         while (i < 3) {\n    i = i + 1;\n}",
    )
    .module
    .to_string();

    let branches = text
        .lines()
        .filter(|line| line.contains("label %loop0, label %leave1"))
        .count();
    assert_eq!(branches, 2);
}

#[test]
fn break_leaves_the_innermost_loop() {
    let unit = compile(
        "while (1 < 2) {\n\
         \x20   while (3 < 4) {\n        break;\n    }\n\
         }",
    );
    let main = unit.module.function("main").expect("main");

    assert_eq!(main.blocks[3].label, "loop2");
    assert_eq!(main.blocks[4].label, "leave3");
    // The inner body branches to the inner leave block, not the outer one.
    assert_eq!(main.blocks[3].term, Some(Terminator::Br(BlockId(4))));
    // The inner loop's entry branch was emitted from the outer loop body.
    assert!(matches!(
        main.blocks[1].term,
        Some(Terminator::CondBr {
            then_block: BlockId(3),
            else_block: BlockId(4),
            ..
        })
    ));
}

#[test]
fn continue_restarts_the_loop_body() {
    let unit = compile(
        "var i: int = 0;\n\
         while (i < 3) {\n    i = i + 1;\n    continue;\n}",
    );
    let main = unit.module.function("main").expect("main");
    assert_eq!(main.blocks[1].label, "loop0");
    assert_eq!(main.blocks[1].term, Some(Terminator::Br(BlockId(1))));
}

#[test]
fn break_outside_a_loop_is_an_error() {
    let err = compile_err("break;");
    assert!(err.contains("outside of a loop"), "unexpected error: {err}");
}

#[test]
fn field_indices_skip_interleaved_methods() {
    let unit = compile(
        "class Inner {\n\
         \x20   a: int;\n\
         \x20   b: int;\n\
         }\n\
         class Outer {\n\
         \x20   first: Inner;\n\
         \x20   func get(): int {\n        return this.first.b;\n    }\n\
         \x20   second: int;\n\
         }\n\
         var o: Outer = new Outer();\n\
         o.second = 7;\n\
         var n: int = o.get();",
    );
    let text = unit.module.to_string();

    assert!(text.contains("%Inner = type { i64, i64 }"));
    // `second` sits at index 1; the method between the fields takes no slot.
    assert!(text.contains("%Outer = type { %Inner, i64 }"));
    assert!(text.contains("define i64 @Outer.get(%Outer* %this)"));
    assert!(text.contains("getelementptr %Outer, %Outer* %this, i32 0, i32 0"));
    assert!(text.contains("getelementptr %Inner, %Inner* %t0, i32 0, i32 1"));
    assert!(text.contains("store i64 7"));
    assert!(text.contains("call void @Outer.-init(%Outer*"));
    assert!(text.contains("call i64 @Outer.get(%Outer*"));
}

#[test]
fn static_methods_take_no_receiver() {
    let text = compile("class M {\n    static func zero(): int {\n        return 0;\n    }\n}")
        .module
        .to_string();
    assert!(text.contains("define i64 @M.zero()"));
}

#[test]
fn new_runs_the_initializer_before_the_constructor() {
    let text = compile(
        "class P {\n\
         \x20   x: int;\n\
         \x20   func constructor(a: int) {\n        this.x = a;\n    }\n\
         }\n\
         var p: P = new P(9);",
    )
    .module
    .to_string();

    let init = text.find("call void @P.-init").expect("initializer call");
    let ctor = text.find("call void @P.constructor").expect("constructor call");
    assert!(init < ctor);
    assert!(text.contains("call void @P.constructor(%P* %t0, i64 9)"));
}

#[test]
fn constructor_arity_is_checked() {
    let err = compile_err(
        "class P {\n\
         \x20   x: int;\n\
         \x20   func constructor(a: int) {\n        this.x = a;\n    }\n\
         }\n\
         var p: P = new P(1, 2);",
    );
    assert!(err.contains("expected 1, found 2"), "unexpected error: {err}");
}

#[test]
fn unknown_names_are_reported() {
    let err = compile_err("f(1);");
    assert!(err.contains("not found"), "unexpected error: {err}");

    let err = compile_err("x = 1;");
    assert!(err.contains("`x`"), "unexpected error: {err}");
}

#[test]
fn plain_import_splices_exports_under_their_own_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("lib.cffc"),
        "export func twice(x: int): int {\n    return x + x;\n}\n",
    )
    .expect("write lib");
    let main = dir.path().join("main.cffc");
    fs::write(&main, "import \"./lib.cffc\";\nvar y: int = twice(2);\n").expect("write main");

    let unit = compile_file(&main, PackageCache::default()).expect("compilation failed");
    let twice = unit.module.function("twice").expect("twice");
    assert!(twice.is_decl);
    assert_eq!(unit.required_imports, vec!["./lib.cffc".to_string()]);
}

#[test]
fn aliased_import_binds_the_alias_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("lib.cffc"),
        "export func twice(x: int): int {\n    return x + x;\n}\n",
    )
    .expect("write lib");
    let main = dir.path().join("main.cffc");
    fs::write(
        &main,
        "from \"./lib.cffc\" import \"twice\" as \"dbl\";\nvar y: int = dbl(2);\n",
    )
    .expect("write main");

    let unit = compile_file(&main, PackageCache::default()).expect("compilation failed");
    assert!(unit.module.function("dbl").is_some());
    assert!(unit.module.function("twice").is_none());
}

#[test]
fn imported_classes_arrive_with_layout_and_prototypes() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("geo.cffc"),
        "export class Point {\n\
         \x20   x: int;\n\
         \x20   y: int;\n\
         \x20   func constructor(a: int, b: int) {\n        this.x = a;\n        this.y = b;\n    }\n\
         }\n",
    )
    .expect("write geo");
    let main = dir.path().join("main.cffc");
    fs::write(
        &main,
        "from \"./geo.cffc\" import \"Point\";\nvar p: Point = new Point(1, 2);\n",
    )
    .expect("write main");

    let unit = compile_file(&main, PackageCache::default()).expect("compilation failed");
    let text = unit.module.to_string();
    assert!(text.contains("%Point = type { i64, i64 }"));
    assert!(text.contains("declare void @Point.-init(%Point*)"));
    assert!(text.contains("call void @Point.constructor(%Point* %t0, i64 1, i64 2)"));
}

#[test]
fn imported_variables_become_external_globals() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("state.cffc"), "export var counter: int = 0;\n").expect("write state");
    let main = dir.path().join("main.cffc");
    fs::write(&main, "import \"./state.cffc\";\ncounter = 5;\n").expect("write main");

    let unit = compile_file(&main, PackageCache::default()).expect("compilation failed");
    let text = unit.module.to_string();
    assert!(text.contains("@counter = external global i64"));
    assert!(text.contains("store i64 5, i64* @counter"));
}
