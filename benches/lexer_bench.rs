//! Lexer and parser throughput benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use veilc::{Lexer, Parser};

const SAMPLE: &str = r#"
struct Point[T] { let x: T let y: T }

enum Shape {
    Dot,
    Line(i32, i32),
    Rect { let w: i32 let h: i32 }
}

fn area(w: i32, h: i32): i32 {
    return w * h;
}

fn classify(s: Shape): i32 {
    switch (s) {
        case Shape::Dot: return 0;
        case Shape::Line(a, b): return a + b;
        case Shape::Rect(w, h): return w * h;
    }
    return -1;
}

fn main(): i32 {
    let p = Point[f64] { x: 1.25, y: 2.5 };
    let mut total = 0;
    for (let mut i = 0; i < 100; i = i + 1) {
        total = total + area(i, i + 1);
    }
    return total;
}
"#;

fn bench_lexer(c: &mut Criterion) {
    c.bench_function("lex_sample", |b| {
        b.iter(|| {
            let count = Lexer::new(black_box(SAMPLE)).count();
            black_box(count)
        })
    });
}

fn bench_parser(c: &mut Criterion) {
    c.bench_function("parse_sample", |b| {
        b.iter(|| {
            let program = Parser::new(black_box(SAMPLE))
                .parse_program()
                .expect("sample parses");
            black_box(program.len())
        })
    });
}

criterion_group!(benches, bench_lexer, bench_parser);
criterion_main!(benches);
