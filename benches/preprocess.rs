use criterion::{criterion_group, criterion_main, Criterion};

use wmlkit::preprocess::*;

fn bench_preprocess_short(c: &mut Criterion) {
    c.bench_function("preprocess", |b| {
        b.iter(|| {
            let input = String::from("\
#define UNIT TYPE X Y
[unit]
    type={TYPE}
    x,y={X},{Y}
[/unit]
#enddef
#textdomain wesnoth-lib
[scenario]
    name=_ \"The Elves Besieged\"
    turns=24
    {UNIT \"Elvish Fighter\" 11 23}
    {UNIT \"Elvish Archer\" 12 23}
#ifdef DEBUG
    gold=1000
#else
    gold=100
#endif
[/scenario]
");

            preprocess_string(&input, None, DefineMap::default(), "wesnoth").unwrap();
        })
    });
}

criterion_group!(benches, bench_preprocess_short);
criterion_main!(benches);
