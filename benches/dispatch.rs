use checkfix::frontend::{Frontend, RustFrontend};
use checkfix::{Config, Dispatcher, Registry};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt::Write;
use std::path::Path;

fn generated_source(functions: usize) -> String {
    let mut source = String::new();
    for i in 0..functions {
        let _ = write!(
            source,
            "fn handler_{i}(id: u32) {{\n    let digest = md5(id);\n    if id > {i} {{\n        println!(\"{{}}\", digest);\n    }}\n    let api_key = \"k-{i}-0000\";\n    store(api_key, digest);\n}}\n\n"
        );
    }
    source
}

fn bench_dispatch(c: &mut Criterion) {
    let config = Config::default();
    let dispatcher = Dispatcher::new(Registry::builtin(&config).into_checkers(), &config);
    let source = generated_source(200);

    c.bench_function("parse_rust_unit", |b| {
        b.iter(|| RustFrontend.parse("bench.rs", Path::new("bench.rs"), black_box(source.clone())))
    });

    let unit = match RustFrontend.parse("bench.rs", Path::new("bench.rs"), source.clone()) {
        Ok(unit) => unit,
        Err(e) => panic!("generated source must parse: {}", e),
    };
    c.bench_function("dispatch_builtin_rules", |b| b.iter(|| dispatcher.dispatch(black_box(&unit))));
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
