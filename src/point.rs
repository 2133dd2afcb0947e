use crate::distance::euclidean_distance;
use crate::error::KMeansError;
use crate::path::ClusterPath;
use ndarray::{Array1, ArrayView1};

/// Immutable coordinate vector
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    coords: Array1<f64>,
}

impl Point {
    pub fn new(coords: Vec<f64>) -> Self {
        Self {
            coords: Array1::from(coords),
        }
    }

    pub fn from_array(coords: Array1<f64>) -> Self {
        Self { coords }
    }

    pub fn coords(&self) -> ArrayView1<'_, f64> {
        self.coords.view()
    }

    pub fn dims(&self) -> usize {
        self.coords.len()
    }

    /// Euclidean distance to `other`
    pub fn distance(&self, other: &Point) -> f64 {
        euclidean_distance(&self.coords.view(), &other.coords.view())
    }

    /// True when every coordinate is bit-for-bit equal
    pub fn same_coords(&self, other: &Point) -> bool {
        self.coords == other.coords
    }

    /// Extract the coordinate fields selected by `positions` from a delimited record.
    ///
    /// # Errors
    ///
    /// Returns `KMeansError::Parse` if the record has fewer fields than the
    /// largest selected position, or a selected field is not a finite number.
    pub fn parse(line: &str, positions: &[usize], delimiter: char) -> Result<Self, KMeansError> {
        let fields: Vec<&str> = line.split(delimiter).collect();
        let mut coords = Vec::with_capacity(positions.len());

        for &pos in positions {
            let field = fields.get(pos).ok_or_else(|| {
                KMeansError::parse(
                    line,
                    format!("expected a field at column {}, found {}", pos, fields.len()),
                )
            })?;
            coords.push(parse_coord(field).ok_or_else(|| {
                KMeansError::parse(line, format!("column {pos} is not numeric: {field:?}"))
            })?);
        }

        Ok(Self::new(coords))
    }
}

fn parse_coord(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Decide whether a record is a header line.
///
/// With a marker, any line containing it is a header. Without one, only the
/// first line of the input can be a header, and only when every selected field
/// holds non-empty text that does not parse as a number. Any other line goes
/// to [`Point::parse`], so empty or `NaN` coordinates fail the run.
pub fn is_header(
    line: &str,
    positions: &[usize],
    delimiter: char,
    marker: Option<&str>,
    first_line: bool,
) -> bool {
    if let Some(marker) = marker {
        return line.contains(marker);
    }
    if !first_line {
        return false;
    }
    let fields: Vec<&str> = line.split(delimiter).collect();
    positions
        .iter()
        .all(|&pos| fields.get(pos).is_some_and(|field| is_label(field)))
}

fn is_label(field: &str) -> bool {
    let field = field.trim();
    !field.is_empty() && field.parse::<f64>().is_err()
}

/// A point placed in the hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct Centroid {
    point: Point,
    path: ClusterPath,
}

impl Centroid {
    pub fn new(point: Point, path: ClusterPath) -> Self {
        Self { point, path }
    }

    pub fn point(&self) -> &Point {
        &self.point
    }

    pub fn path(&self) -> &ClusterPath {
        &self.path
    }

    /// Position among the centroids of its bucket
    pub fn position(&self) -> u16 {
        self.path.last_index().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_selects_columns() {
        let line = "fr,paris,Paris,A8,,48.86,2.35";
        let point = Point::parse(line, &[5, 6], ',').unwrap();
        assert_eq!(point.dims(), 2);
        assert_relative_eq!(point.coords()[0], 48.86);
        assert_relative_eq!(point.coords()[1], 2.35);
    }

    #[test]
    fn test_parse_column_order_is_kept() {
        let point = Point::parse("1,2,3", &[2, 0], ',').unwrap();
        assert_eq!(point, Point::new(vec![3.0, 1.0]));
    }

    #[test]
    fn test_parse_short_record_fails() {
        let err = Point::parse("1,2", &[0, 4], ',').unwrap_err();
        assert!(matches!(err, KMeansError::Parse { .. }));
    }

    #[test]
    fn test_parse_non_numeric_fails() {
        let err = Point::parse("1,abc", &[0, 1], ',').unwrap_err();
        assert!(matches!(err, KMeansError::Parse { .. }));
        assert!(Point::parse("1,NaN", &[0, 1], ',').is_err());
    }

    #[test]
    fn test_distance() {
        let a = Point::new(vec![0.0, 0.0]);
        let b = Point::new(vec![3.0, 4.0]);
        assert_relative_eq!(a.distance(&b), 5.0);
        assert_relative_eq!(b.distance(&a), 5.0);
        assert_relative_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_header_detection_by_content() {
        let header = "Country,City,AccentCity,Region,Population,Latitude,Longitude";
        assert!(is_header(header, &[5, 6], ',', None, true));
        assert!(!is_header("fr,paris,Paris,A8,,48.86,2.35", &[5, 6], ',', None, true));
        // A partly numeric line is a malformed record, not a header.
        assert!(!is_header("fr,paris,Paris,A8,,48.86,east", &[5, 6], ',', None, true));
        assert!(!is_header("", &[5, 6], ',', None, true));
    }

    #[test]
    fn test_header_detection_needs_text_in_every_field() {
        assert!(!is_header(",", &[0, 1], ',', None, true));
        assert!(!is_header("NaN,NaN", &[0, 1], ',', None, true));
        assert!(!is_header("x", &[0, 1], ',', None, true));
        assert!(is_header("n/a,n/a", &[0, 1], ',', None, true));
    }

    #[test]
    fn test_only_first_line_is_a_header_by_content() {
        assert!(is_header("x,y", &[0, 1], ',', None, true));
        assert!(!is_header("x,y", &[0, 1], ',', None, false));
        assert!(!is_header("n/a,n/a", &[0, 1], ',', None, false));
    }

    #[test]
    fn test_header_detection_by_marker() {
        let header = "Country,City,Latitude,Longitude";
        assert!(is_header(header, &[2, 3], ',', Some("Country"), true));
        assert!(is_header(header, &[2, 3], ',', Some("Country"), false));
        assert!(!is_header("fr,paris,48.86,2.35", &[2, 3], ',', Some("Country"), true));
    }

    #[test]
    fn test_centroid_position() {
        let c = Centroid::new(
            Point::new(vec![1.0]),
            ClusterPath::from_indexes(vec![2, 5]),
        );
        assert_eq!(c.position(), 5);
        assert_eq!(c.path().parent().to_string(), "2");
    }
}
