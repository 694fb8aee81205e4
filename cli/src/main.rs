use std::env;

use anyhow::{Context, Result};
use env_logger::Env;
use lazyfunc::{Args, Builtin, Callable, Error, Function, LazyFunc, Signature, Value};
use log::info;

const DEFAULT_TEMPERATURE: f64 = 2e3;
const DEFAULT_ENERGIES: [f64; 4] = [1e3, 5e3, 10e3, 20e3];
const IMPEDANCE: f64 = 50.0;

fn map_energy(args: &Args, f: impl Fn(f64) -> f64) -> lazyfunc::Result<Value> {
    let energy = args.require(0, "energy")?;
    energy.map_float(f).ok_or_else(|| {
        Error::function(format!("energy must be numeric, got {}", energy.type_name()))
    })
}

/// Thermal power spectrum, equal to the bremsstrahlung spectrum at high energies.
fn bremsstrahlung_spectrum() -> Result<LazyFunc> {
    let signature: Signature = "energy, /, temperature".parse()?;
    Ok(LazyFunc::new(Callable::new(
        "bremsstrahlung_spectrum",
        signature,
        |args| {
            let temperature = args.float(1, "temperature")?;
            map_energy(args, |energy| (-energy / temperature).exp())
        },
    )))
}

/// Approximation of a diode responsivity table.
fn responsivity() -> Result<LazyFunc> {
    const THRESHOLD: f64 = 10e3;
    Ok(LazyFunc::new(Callable::new(
        "responsivity",
        "energy".parse()?,
        |args| {
            map_energy(args, |energy| {
                if energy < THRESHOLD {
                    0.25
                } else {
                    0.25 * (-(energy - THRESHOLD) / THRESHOLD).exp()
                }
            })
        },
    )))
}

/// Piecewise linear table, zero outside its range.
struct Interpolated {
    points: Vec<(f64, f64)>,
}

impl Interpolated {
    fn at(&self, x: f64) -> f64 {
        self.points
            .windows(2)
            .find(|w| w[0].0 <= x && x <= w[1].0)
            .map_or(0.0, |w| {
                let ((x0, y0), (x1, y1)) = (w[0], w[1]);
                y0 + (y1 - y0) * (x - x0) / (x1 - x0)
            })
    }
}

impl Function for Interpolated {
    fn signature(&self) -> Signature {
        Signature::new(vec![lazyfunc::Param::positional_only("energy")]).unwrap_or_default()
    }

    fn call(&self, args: &Args) -> lazyfunc::Result<Value> {
        map_energy(args, |energy| self.at(energy))
    }
}

fn transmission() -> LazyFunc {
    let filter = Interpolated {
        points: vec![
            (0.0, 0.0),
            (1e3, 0.01),
            (2e3, 0.2),
            (5e3, 0.6),
            (10e3, 0.85),
            (20e3, 0.95),
            (30e3, 0.98),
        ],
    };
    LazyFunc::named(Callable::from_function(filter), "transmission")
}

fn parse_args() -> Result<(f64, Vec<f64>)> {
    let mut args = env::args().skip(1);
    let temperature = match args.next() {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("invalid temperature '{arg}'"))?,
        None => DEFAULT_TEMPERATURE,
    };
    let energies = args
        .map(|arg| {
            arg.parse()
                .with_context(|| format!("invalid energy '{arg}'"))
        })
        .collect::<Result<Vec<f64>>>()?;
    if energies.is_empty() {
        return Ok((temperature, DEFAULT_ENERGIES.to_vec()));
    }
    Ok((temperature, energies))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let (temperature, energies) = parse_args()?;

    let measured = bremsstrahlung_spectrum()? * transmission() * responsivity()? / IMPEDANCE;
    println!("{measured}{}", measured.signature());

    let first = energies[0];
    let value = measured
        .call(Args::from(first).kwarg("temperature", temperature))
        .with_context(|| format!("evaluating {measured} at {first}"))?;
    println!("{measured}({first}, temperature={temperature}) = {value}");

    {
        let measured = measured.set_kwargs(("temperature", temperature));
        info!("temperature fixed at {temperature}");
        for &energy in &energies {
            println!("{energy:>10} -> {}", measured.call(energy)?);
        }
        let all = measured.call(Value::Vector(energies.clone()))?;
        println!("{:>10} -> {all}", "all");
    }

    let log_measured = LazyFunc::new(Builtin::Ln).compose(&measured, ())?;
    let value = log_measured.call(Args::from(first).kwarg("temperature", temperature))?;
    println!("{log_measured}({first}) = {value}");
    Ok(())
}
