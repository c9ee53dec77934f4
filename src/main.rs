use tensorout::tensor::storage::default_allocator;
use tensorout::{
    Context, DataType, LoggingConfig, MemoryFormat, Tensor, TensorOptions, for_blob,
    init_tracing, mul, mul_, mul_out, mul_outf,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(&LoggingConfig::default().with_directives("tensorout=debug,info"))?;

    let a = Tensor::rand_uniform(&[2, 3], -1.0, 1.0)?;
    let b = Tensor::from_slice(&[3], &[1.0f32, 10.0, 100.0])?;

    // functional
    let c = mul(&a, &b)?;
    println!("mul        {:?} -> {:?}", c.sizes(), c.to_vec::<f32>()?);

    // out, already the right shape and contiguous: written directly
    let mut out = Tensor::zeros(&[2, 3], &TensorOptions::default())?;
    mul_out(&mut out, &a, &b)?;
    println!("mul_out    {:?}", out.to_vec::<f32>()?);

    // out with the wrong shape: resized in place
    let mut small = Tensor::empty(&[0], &TensorOptions::default())?;
    mul_outf(&a, &b, &mut small)?;
    println!("resized    {:?} strides {:?}", small.sizes(), small.strides());

    // out laid out column-major: computed in a proxy and copied back
    let mut transposed = Tensor::zeros(&[3, 2], &TensorOptions::default())?.transpose(0, 1)?;
    mul_out(&mut transposed, &a, &b)?;
    println!(
        "proxied    {:?} strides {:?}",
        transposed.to_vec::<f32>()?,
        transposed.strides()
    );

    // in place
    let mut acc = a.clone();
    mul_(&mut acc, &b)?;
    println!("mul_       {:?}", acc.to_vec::<f32>()?);

    // channels-last inputs keep producing channels-last outputs
    let cl_options = TensorOptions::new(DataType::Float).with_memory_format(MemoryFormat::ChannelsLast);
    let image = Tensor::zeros(&[1, 3, 2, 2], &cl_options)?;
    let scaled = mul(&image, &Tensor::full(&[], 0.5f32)?)?;
    println!("layout     {:?} {:?}", scaled.suggest_memory_format(), scaled.strides());

    // external memory released through a context object
    let mut owned: Box<Vec<i32>> = Box::new((0..6).collect());
    let data = owned.as_mut_ptr().cast::<u8>();
    let imported = for_blob(data, &[2, 3])
        .options(TensorOptions::new(DataType::Int32))
        .context(Context::from_box(owned))
        .allocator(default_allocator())
        .resizable_storage()
        .make_tensor()?;
    println!(
        "imported   {:?} ({} bytes)",
        imported.to_vec::<i32>()?,
        imported.storage().nbytes()
    );

    Ok(())
}
