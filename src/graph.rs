use super::{stack, Config, Result};

/// Print the stack graph as yaml, or as graphviz dot
pub fn generate(conf: &Config, dot: bool) -> Result<()> {
    let graph = stack::graph(conf)?;
    if dot {
        println!("{}", graph.to_dot());
    } else {
        println!("{}", graph.to_yaml()?);
    }
    Ok(())
}

/// Print creation order, or teardown order, with the waves they would be applied in
pub fn order(conf: &Config, teardown: bool) -> Result<()> {
    let graph = stack::graph(conf)?;
    let mut layers = graph.layers();
    let ids = if teardown {
        layers.reverse();
        graph.teardown_order()
    } else {
        graph.order()
    };
    for id in ids {
        println!("{}", id);
    }
    for (i, layer) in layers.iter().enumerate() {
        debug!("wave {}: {}", i, layer.join(", "));
    }
    Ok(())
}
