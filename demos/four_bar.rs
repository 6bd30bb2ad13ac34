use linkage_dynamics::*;

fn main() -> Result<()> {
    let params = FourBarParameters {
        damping: 1.0,
        stiffness: 10.0,
        ..FourBarParameters::default()
    };
    let mut model = four_bar(&params)?;
    let energy = EnergyOutput::new(&model.system, &model.system.total_energy()?);
    let points = PointsOutput::new(&model.system, &model.joints);

    let grid = TimeGrid::frames(0.0, 10.0)?;
    let config = IntegratorConfig::default();
    let trajectory = simulate(&mut model.system, &grid, &config)?;

    let constants = model.system.constants();
    let energies = energy.calc(&trajectory, constants)?;
    let positions = points.calc(&trajectory, constants)?;

    println!(
        "{} samples, {} steps accepted, {} rejected",
        trajectory.len(),
        trajectory.stats.accepted,
        trajectory.stats.rejected
    );
    for i in (0..trajectory.len()).step_by(30) {
        let tip = positions[i][3];
        println!(
            "t = {:5.2} s  qA = {:7.2} deg  E = {:.6} J  tip = ({:+.2e}, {:+.2e})",
            trajectory.times[i],
            trajectory.row(i)[0].to_degrees(),
            energies[i],
            tip.x - model.pin.x,
            tip.y - model.pin.y,
        );
    }
    println!(
        "amplitude {:.2} deg over [0, 3] s, {:.2} deg over [7, 10] s",
        oscillation_amplitude(&trajectory, 0, 0.0, 3.0).to_degrees(),
        oscillation_amplitude(&trajectory, 0, 7.0, 10.0).to_degrees()
    );
    Ok(())
}
