//! GeoTIFF reading and writing
//!
//! Georeferencing is taken from `ModelTransformation` when present, else
//! from `ModelPixelScale` + `ModelTiepoint`. Point-sampled rasters
//! (`GTRasterTypeGeoKey = PixelIsPoint`) are shifted half a pixel on read and
//! back on write so the in-memory transform always describes pixel corners.

use super::{GeoTransform, Projection, Raster, RasterHeader, NODATA, RASTER_PIXEL_IS_POINT};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, compression::Lzw, TiffEncoder};
use tiff::tags::Tag;

/// Raster I/O errors
#[derive(Debug, Error)]
pub enum RasterError {
    /// File could not be opened
    #[error("Cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Not a decodable TIFF
    #[error("Cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// No usable georeferencing
    #[error("Missing or invalid georeferencing in {path}: {reason}")]
    Georeference { path: PathBuf, reason: String },

    /// Output could not be encoded or persisted
    #[error("Cannot write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

fn decode_error(path: &Path) -> impl Fn(tiff::TiffError) -> RasterError + '_ {
    move |e| RasterError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, RasterError> {
    let file = File::open(path).map_err(|source| RasterError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let decoder = Decoder::new(BufReader::new(file)).map_err(decode_error(path))?;
    Ok(decoder.with_limits(Limits::unlimited()))
}

/// Read size, georeferencing and no-data value without decoding pixels
pub fn read_header(path: &Path) -> Result<RasterHeader, RasterError> {
    let mut decoder = open_decoder(path)?;
    header_from_decoder(&mut decoder, path)
}

/// Read band 1 of a GeoTIFF
pub fn read_raster(path: &Path) -> Result<Raster, RasterError> {
    let mut decoder = open_decoder(path)?;
    let header = header_from_decoder(&mut decoder, path)?;

    let image = decoder.read_image().map_err(decode_error(path))?;
    let samples = to_f32(image);

    let pixels = header.pixel_count();
    if pixels == 0 || samples.len() < pixels || samples.len() % pixels != 0 {
        return Err(RasterError::Decode {
            path: path.to_path_buf(),
            reason: format!(
                "{} samples for a {}x{} image",
                samples.len(),
                header.width,
                header.height
            ),
        });
    }

    // Interleaved multi-sample images: keep the first sample of each pixel
    let per_pixel = samples.len() / pixels;
    let data = if per_pixel == 1 {
        samples
    } else {
        samples.into_iter().step_by(per_pixel).collect()
    };

    tracing::trace!(
        file = %path.display(),
        width = header.width,
        height = header.height,
        "Raster decoded"
    );

    Ok(Raster::new(header, data))
}

#[allow(unreachable_patterns)]
fn to_f32(image: DecodingResult) -> Vec<f32> {
    match image {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => Vec::new(),
    }
}

fn header_from_decoder<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<RasterHeader, RasterError> {
    let (width, height) = decoder.dimensions().map_err(decode_error(path))?;

    let f64_tag = |decoder: &mut Decoder<R>, tag: Tag| -> Result<Option<Vec<f64>>, RasterError> {
        decoder
            .find_tag(tag)
            .and_then(|value| value.map(|v| v.into_f64_vec()).transpose())
            .map_err(decode_error(path))
    };

    let transformation = f64_tag(decoder, Tag::ModelTransformationTag)?;
    let pixel_scale = f64_tag(decoder, Tag::ModelPixelScaleTag)?;
    let tiepoint = f64_tag(decoder, Tag::ModelTiepointTag)?;

    let geo_keys = decoder
        .find_tag(Tag::GeoKeyDirectoryTag)
        .and_then(|value| value.map(|v| v.into_u16_vec()).transpose())
        .map_err(decode_error(path))?
        .unwrap_or_default();
    let double_params = f64_tag(decoder, Tag::GeoDoubleParamsTag)?.unwrap_or_default();
    let ascii_params = decoder
        .find_tag(Tag::GeoAsciiParamsTag)
        .and_then(|value| value.map(|v| v.into_string()).transpose())
        .map_err(decode_error(path))?
        .unwrap_or_default();
    let nodata = decoder
        .find_tag(Tag::GdalNodata)
        .and_then(|value| value.map(|v| v.into_string()).transpose())
        .map_err(decode_error(path))?
        .and_then(|text| text.trim_end_matches('\0').trim().parse::<f64>().ok());

    let projection = Projection {
        geo_keys,
        double_params,
        ascii_params,
    };

    let georeference_error = |reason: &str| RasterError::Georeference {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut transform = match (transformation, pixel_scale, tiepoint) {
        (Some(m), _, _) if m.len() >= 16 => GeoTransform([m[3], m[0], m[1], m[7], m[4], m[5]]),
        (_, Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let (col, row, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            GeoTransform([
                x - col * scale[0],
                scale[0],
                0.0,
                y + row * scale[1],
                0.0,
                -scale[1],
            ])
        }
        (None, None, None) => return Err(georeference_error("no georeferencing tags")),
        _ => return Err(georeference_error("incomplete georeferencing tags")),
    };

    if projection.raster_type() == Some(RASTER_PIXEL_IS_POINT) {
        transform = transform.offset(-0.5, -0.5);
    }

    if transform.invert().is_none() {
        return Err(georeference_error("degenerate geotransform"));
    }

    Ok(RasterHeader {
        width: width as usize,
        height: height as usize,
        transform,
        projection,
        nodata,
    })
}

/// Write a single-band Float32 LZW-compressed GeoTIFF
///
/// Data is written to a hidden temporary file next to `path` and renamed
/// into place once complete; on any failure nothing is left at `path`.
/// The no-data value written is always [`NODATA`].
pub fn write_raster(path: &Path, header: &RasterHeader, data: &[f32]) -> Result<(), RasterError> {
    let write_error = |reason: String| RasterError::Write {
        path: path.to_path_buf(),
        reason,
    };

    if data.len() != header.pixel_count() {
        return Err(write_error(format!(
            "{} samples for a {}x{} image",
            data.len(),
            header.width,
            header.height
        )));
    }
    let width = u32::try_from(header.width).map_err(|e| write_error(e.to_string()))?;
    let height = u32::try_from(header.height).map_err(|e| write_error(e.to_string()))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| write_error(e.to_string()))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".nwra-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| write_error(e.to_string()))?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        encode(&mut writer, width, height, header, data).map_err(|e| write_error(e.to_string()))?;
        writer.flush().map_err(|e| write_error(e.to_string()))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| write_error(e.to_string()))?;

    // Dropping the temp file on an error path above removes it
    temp.persist(path)
        .map_err(|e| write_error(e.error.to_string()))?;
    Ok(())
}

fn encode<W: Write + Seek>(
    writer: &mut W,
    width: u32,
    height: u32,
    header: &RasterHeader,
    data: &[f32],
) -> tiff::TiffResult<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image_with_compression::<colortype::Gray32Float, _>(
        width,
        height,
        Lzw::default(),
    )?;

    let projection = &header.projection;
    let transform = if projection.raster_type() == Some(RASTER_PIXEL_IS_POINT) {
        header.transform.offset(0.5, 0.5)
    } else {
        header.transform
    };
    let gt = transform.0;

    let tags = image.encoder();
    if transform.is_north_up() && gt[5] < 0.0 {
        tags.write_tag(Tag::ModelPixelScaleTag, &[gt[1], -gt[5], 0.0][..])?;
        tags.write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, gt[0], gt[3], 0.0][..])?;
    } else {
        let matrix = [
            gt[1], gt[2], 0.0, gt[0],
            gt[4], gt[5], 0.0, gt[3],
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        tags.write_tag(Tag::ModelTransformationTag, &matrix[..])?;
    }
    if !projection.geo_keys.is_empty() {
        tags.write_tag(Tag::GeoKeyDirectoryTag, &projection.geo_keys[..])?;
    }
    if !projection.double_params.is_empty() {
        tags.write_tag(Tag::GeoDoubleParamsTag, &projection.double_params[..])?;
    }
    if !projection.ascii_params.is_empty() {
        tags.write_tag(Tag::GeoAsciiParamsTag, projection.ascii_params.as_str())?;
    }
    tags.write_tag(Tag::GdalNodata, format!("{}", NODATA).as_str())?;

    image.write_data(data)
}
