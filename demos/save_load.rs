use rust_dense::{Activation, LayerStack, MissingPolicy, StackBuilder};

fn main() -> rust_dense::Result<()> {
    let stack: LayerStack<f64> = StackBuilder::new(4)?
        .name("persisted")
        .add_layer(8, Activation::ReLU, MissingPolicy::Dense)?
        .add_layer(1, Activation::Sigmoid, MissingPolicy::None)?
        .build_with_seed(0)?;

    let bytes = stack.to_bytes()?;
    let loaded = LayerStack::<f64>::from_bytes(&bytes)?;
    assert!(loaded.bitwise_eq(&stack));
    println!("binary: {} bytes, {} parameters", bytes.len(), loaded.parameter_count());

    save_json(&stack)?;
    Ok(())
}

#[cfg(feature = "serde")]
fn save_json(stack: &LayerStack<f64>) -> rust_dense::Result<()> {
    let path = "target/tmp_stack.json";
    stack.save_json(path)?;
    let loaded = LayerStack::<f64>::load_json(path)?;
    assert!(loaded.bitwise_eq(stack));
    println!("json: saved and loaded {path}");
    Ok(())
}

#[cfg(not(feature = "serde"))]
fn save_json(_stack: &LayerStack<f64>) -> rust_dense::Result<()> {
    println!("json: enable the `serde` feature: cargo run --example save_load --features serde");
    Ok(())
}
