use eucalib::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let width = 1024;
    let height = 768;
    let truth = [0.6, 1.1, 350.0, 350.0, 512.0, 384.0];
    let camera = EnhancedUnified::new(width, height, truth)?;

    let board = BoardDescriptor::new(8, 6, 0.05)?;
    let poses = vec![
        Transform::new(-0.175, -0.125, 0.5, 0.0, 0.0, 0.0),
        Transform::new(-0.15, -0.1, 0.45, 0.4, -0.2, 0.1),
        Transform::new(-0.25, -0.15, 0.4, -0.35, 0.45, -0.2),
        Transform::new(-0.05, -0.2, 0.55, 0.2, -0.5, 0.6),
        Transform::new(-0.3, 0.0, 0.35, -0.5, -0.3, -0.4),
    ];

    // Render what the camera would see, black outside the image circle.
    let generator = BoardGenerator::new(&camera, board).with_out_of_view(0);
    for (i, pose) in poses.iter().enumerate() {
        let image = generator.generate(pose);
        image::save_buffer(
            format!("board_{i}.png"),
            image.as_raw(),
            width as u32,
            height as u32,
            image::ExtendedColorType::L8,
        )?;
    }

    // Start from the usual initial guess, with the principal point at the
    // image center.
    let mut params = vec![0.5, 1.0, 500.0, 500.0, width as f64 / 2.0, height as f64 / 2.0];
    let mut calibration = IntrinsicCalibration::new(&camera, CalibrationConfig::default());
    calibration.initialize(&SyntheticSource::new(&camera, board, poses))?;

    let before = calibration.residual_analysis(&params)?;
    let report = calibration.compute(&mut params)?;

    println!("model: {}", camera.name());
    println!(
        "termination: {:?} after {} iterations",
        report.termination, report.iterations
    );
    println!("initial: {before}");
    println!("final:   {}", report.residuals);
    println!("{:>12} {:>12} {:>12}", "parameter", "estimate", "truth");
    for ((name, estimate), truth) in ["alpha", "beta", "fu", "fv", "u0", "v0"]
        .iter()
        .zip(&params)
        .zip(truth)
    {
        println!("{name:>12} {estimate:>12.6} {truth:>12.6}");
    }

    Ok(())
}
