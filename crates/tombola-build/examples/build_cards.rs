use std::env;

use tombola_build::BuildEngine;
use tombola_core::Parameters;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let values: Vec<u64> = env::args()
        .skip(1)
        .map(|arg| arg.parse::<u64>())
        .collect::<Result<_, _>>()?;
    let [range, cards, rows, cols, rest @ ..] = values.as_slice() else {
        return Err("usage: build_cards R T m n [seed]".into());
    };

    let mut params = Parameters::new(
        u32::try_from(*range)?,
        u32::try_from(*cards)?,
        u32::try_from(*rows)?,
        u32::try_from(*cols)?,
    );
    params.seed.value = rest.first().copied().unwrap_or(0);

    let outcome = BuildEngine::new(params).run()?;
    for (index, card) in outcome.cards.iter().enumerate() {
        println!("card {index}");
        for row in card.to_matrix() {
            let cells: Vec<String> = row.iter().map(|value| format!("{value:>3}")).collect();
            println!("{}", cells.join(" "));
        }
    }
    println!(
        "swap_attempts={} cards_rebuilt={}",
        outcome.metrics.swap_attempts, outcome.metrics.cards_rebuilt
    );
    Ok(())
}
