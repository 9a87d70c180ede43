use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use rust_dense::{Activation, LayerStack, MissingPolicy, Optimizer, StackBuilder};

fn main() -> rust_dense::Result<()> {
    // Task: learn y = tanh(x0 + x1), where x1 is missing a third of the time.
    // The first layer learns a replacement value for x1.
    let mut stack: LayerStack<f32> = StackBuilder::new(2)?
        .add_layer(8, Activation::Tanh, MissingPolicy::Input)?
        .add_layer(1, Activation::Identity, MissingPolicy::None)?
        .build_with_seed(0)?;

    let mut rng = StdRng::seed_from_u64(1);
    let dist = Uniform::new(-1.0_f32, 1.0_f32);
    let samples: Vec<([f32; 2], f32)> = (0..256)
        .map(|k| {
            let x0 = dist.sample(&mut rng);
            let x1 = dist.sample(&mut rng);
            let seen = if k % 3 == 0 { f32::NAN } else { x1 };
            ([x0, seen], (x0 + x1).tanh())
        })
        .collect();

    let mut scratch = stack.scratch();
    let mut grads = stack.gradients();
    let mut out = [0.0_f32; 1];
    let mut state = Optimizer::ADAM.state(stack.parameter_count())?;

    for epoch in 0..50 {
        let mut loss = 0.0;
        for (x, t) in &samples {
            stack.fprop_into(x, &mut scratch, &mut out)?;
            let err = out[0] - t;
            loss += 0.5 * err * err;

            grads.fill(0.0);
            stack.bprop(&[err], &mut scratch, grads.values_mut(), None, 1.0)?;
            state.step(stack.parameters_mut(), &grads, 1e-2)?;
        }
        if epoch % 10 == 9 {
            println!("epoch {:>3}: mse/2 = {:.5}", epoch + 1, loss / samples.len() as f32);
        }
    }

    let replacement = stack.layers()[0].missing_replacements()[1];
    println!("learned replacement for x1: {replacement:.4}");
    Ok(())
}
