use crate::Error;

/// Representation of a biaxial ellipsoid of revolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipsoid {
    a: f64,
    f: f64,
}

/// GRS80 is the default ellipsoid.
impl Default for Ellipsoid {
    fn default() -> Ellipsoid {
        Ellipsoid::new(6_378_137.0, 1. / 298.257_222_100_882_7)
    }
}

impl Ellipsoid {
    /// User defined ellipsoid
    #[must_use]
    pub fn new(semimajor_axis: f64, flattening: f64) -> Ellipsoid {
        Ellipsoid {
            a: semimajor_axis,
            f: flattening,
        }
    }

    /// User defined ellipsoid, from its semi-axes
    #[must_use]
    pub fn from_axes(semimajor_axis: f64, semiminor_axis: f64) -> Ellipsoid {
        Ellipsoid::new(semimajor_axis, (semimajor_axis - semiminor_axis) / semimajor_axis)
    }

    /// Predefined ellipsoid
    pub fn named(name: &str) -> Result<Ellipsoid, Error> {
        let e = match name {
            "GRS80" => Ellipsoid::new(6_378_137.0, 1. / 298.257_222_100_882_7),
            "WGS84" => Ellipsoid::new(6_378_137.0, 1. / 298.257_223_563),
            "intl" => Ellipsoid::new(6_378_388.0, 1. / 297.0),
            "Helmert" => Ellipsoid::new(6_378_200.0, 1. / 298.3),
            "clrk66" => Ellipsoid::new(6_378_206.4, 1. / 294.978_698_2),
            "clrk80" => Ellipsoid::new(6_378_249.145, 1. / 293.465),
            "bessel" => Ellipsoid::new(6_377_397.155, 1. / 299.152_812_8),
            "sphere" => Ellipsoid::new(6_371_008.8, 0.),
            _ => return Err(Error::NotFound(String::from(name), String::from(" (ellipsoid)"))),
        };
        Ok(e)
    }

    // ----- Axes and flattenings --------------------------------------------------

    /// The semimajor axis, *a*
    #[must_use]
    pub fn semimajor_axis(&self) -> f64 {
        self.a
    }

    /// The semiminor axis, *b*
    #[must_use]
    pub fn semiminor_axis(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// The flattening, *f = (a - b)/a*
    #[must_use]
    pub fn flattening(&self) -> f64 {
        self.f
    }

    // ----- Eccentricities --------------------------------------------------------

    /// The squared eccentricity *e² = (a² - b²) / a²*.
    #[must_use]
    pub fn eccentricity_squared(&self) -> f64 {
        self.f * (2_f64 - self.f)
    }

    /// The squared second eccentricity *e'² = (a² - b²) / b² = e² / (1 - e²)*
    #[must_use]
    pub fn second_eccentricity_squared(&self) -> f64 {
        let es = self.eccentricity_squared();
        es / (1.0 - es)
    }

    // ----- Curvatures ------------------------------------------------------------

    /// The radius of curvature in the prime vertical, *N*
    #[must_use]
    pub fn prime_vertical_radius_of_curvature(&self, latitude: f64) -> f64 {
        if self.f == 0.0 {
            return self.a;
        }
        self.a / (1.0 - latitude.sin().powi(2) * self.eccentricity_squared()).sqrt()
    }

    /// The meridian radius of curvature, *M*
    #[must_use]
    pub fn meridian_radius_of_curvature(&self, latitude: f64) -> f64 {
        if self.f == 0.0 {
            return self.a;
        }
        let num = self.a * (1.0 - self.eccentricity_squared());
        let denom = (1.0 - latitude.sin().powi(2) * self.eccentricity_squared()).powf(1.5);
        num / denom
    }
}

// ----- Tests ---------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    #[test]
    fn ellipsoid() -> Result<(), Error> {
        let ellps = Ellipsoid::named("GRS80")?;
        assert_eq!(ellps.semimajor_axis(), 6378137.0);
        assert_float_eq!(ellps.flattening(), 1. / 298.257_222_100_882_7, abs <= 1e-20);
        assert_float_eq!(ellps.semiminor_axis(), 6_356_752.314_140_347, abs <= 1e-8);
        assert_float_eq!(ellps.eccentricity_squared(), 0.006_694_380_022_903_417, abs <= 1e-15);
        assert_float_eq!(
            ellps.second_eccentricity_squared(),
            0.006_739_496_775_481_624,
            abs <= 1e-15
        );

        let same = Ellipsoid::from_axes(ellps.semimajor_axis(), ellps.semiminor_axis());
        assert_float_eq!(same.flattening(), ellps.flattening(), abs <= 1e-15);
        assert_eq!(Ellipsoid::default(), ellps);

        assert!(matches!(Ellipsoid::named("unknown"), Err(Error::NotFound(..))));
        Ok(())
    }

    #[test]
    fn curvatures() -> Result<(), Error> {
        let ellps = Ellipsoid::named("GRS80")?;
        // At the equator, N = a and M = a(1 - e²)
        assert_float_eq!(ellps.prime_vertical_radius_of_curvature(0.), 6378137.0, abs <= 1e-6);
        assert_float_eq!(
            ellps.meridian_radius_of_curvature(0.),
            6378137.0 * (1. - ellps.eccentricity_squared()),
            abs <= 1e-6
        );
        // At the poles, both equal the polar radius of curvature a²/b
        let c = 6378137.0_f64.powi(2) / ellps.semiminor_axis();
        let pole = std::f64::consts::FRAC_PI_2;
        assert_float_eq!(ellps.prime_vertical_radius_of_curvature(pole), c, abs <= 1e-6);
        assert_float_eq!(ellps.meridian_radius_of_curvature(pole), c, abs <= 1e-6);

        let sphere = Ellipsoid::named("sphere")?;
        assert_eq!(sphere.meridian_radius_of_curvature(1.), sphere.semimajor_axis());
        Ok(())
    }
}
