use criterion::{criterion_group, criterion_main, Criterion};

use wmlkit::binary::{write_binary, BinarySchema};
use wmlkit::parser::read;

fn bench_config(c: &mut Criterion) {
    c.bench_function("config", |b| {
        b.iter(|| {
            let input = String::from("\
#textdomain wesnoth-lib
[scenario]
    name=_ \"The Elves Besieged\"
    turns=24
    [side]
        controller=human
        gold=100
        [unit]
            type=Elvish Fighter
            x,y=11,23
        [/unit]
    [/side]
    [side]
        controller=ai
        gold=120
    [/side]
[/scenario]
");

            let cfg = read(&input).unwrap();

            let mut schema = BinarySchema::new();
            write_binary(&cfg, &mut schema).unwrap();
        })
    });
}

criterion_group!(benches, bench_config);
criterion_main!(benches);
