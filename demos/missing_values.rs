use rust_dense::{Activation, DenseLayer, MissingPolicy};

fn main() -> rust_dense::Result<()> {
    let complete = [0.5_f32, -1.0, 2.0];
    let holes = [0.5_f32, f32::NAN, 2.0];

    for policy in MissingPolicy::ALL {
        let mut layer =
            DenseLayer::<f32>::new_with_seed("demo", 3, 2, Activation::Identity, policy, 0)?;
        // Give the learned missing-value parameters something visible to do.
        layer.missing_replacements_mut().fill(-1.0);
        layer.missing_activations_mut().fill(0.25);

        let full = layer.apply(&complete)?;
        match layer.apply(&holes) {
            Ok(partial) => println!(
                "{:>5}: complete={full:?} missing={partial:?} params={}",
                policy.name(),
                layer.parameter_count()
            ),
            Err(e) => println!("{:>5}: complete={full:?} missing -> {e}", policy.name()),
        }
    }
    Ok(())
}
